use std::future::Future;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::transport::RequestBody;

const CHECKSUM_BUFFER: usize = 64 * 1024;

/// A dump of known length that can be replayed from any offset.
pub trait DumpSource {
    fn length(&self) -> u64;

    /// Body carrying bytes `[offset, length)`.
    fn read_from(&self, offset: u64) -> impl Future<Output = io::Result<RequestBody>> + Send;

    fn crc32(&self) -> impl Future<Output = io::Result<u32>> + Send;
}

#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    length: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }
        Ok(Self {
            path,
            length: metadata.len(),
        })
    }
}

impl DumpSource for FileSource {
    fn length(&self) -> u64 {
        self.length
    }

    async fn read_from(&self, offset: u64) -> io::Result<RequestBody> {
        let remaining = self.length.saturating_sub(offset);
        if remaining == 0 {
            return Ok(RequestBody::Empty);
        }
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        Ok(RequestBody::Reader {
            reader: Box::new(file.take(remaining)),
            length: remaining,
        })
    }

    async fn crc32(&self) -> io::Result<u32> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let mut hasher = crc32fast::Hasher::new();
        let mut buffer = vec![0u8; CHECKSUM_BUFFER];
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hasher.finalize())
    }
}
