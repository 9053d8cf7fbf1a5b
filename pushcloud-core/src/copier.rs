use tracing::info;

use crate::backoff::{RetryPolicy, Sleeper};
use crate::client::ConsoleClient;
use crate::credentials::Credentials;
use crate::error::CopyError;
use crate::prompt::Prompter;
use crate::source::DumpSource;
use crate::transport::HttpTransport;
use crate::upload::ResumableUploader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyReport {
    pub bytes: u64,
    pub failed_rounds: u32,
    pub crc32: u32,
}

/// Runs one copy: authenticate, negotiate the target, upload, trigger the
/// import. Stages run strictly in order and the first failure ends the copy.
pub struct Copier<T, S, P> {
    transport: T,
    sleeper: S,
    prompter: P,
    policy: RetryPolicy,
}

impl<T: HttpTransport, S: Sleeper, P: Prompter> Copier<T, S, P> {
    pub fn with_parts(transport: T, sleeper: S, prompter: P, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            prompter,
            policy,
        }
    }

    /// Copies `source` to the console at `console_url`. The credentials are
    /// consumed and wiped as soon as the token has been obtained.
    pub async fn copy<D: DumpSource>(
        &self,
        console_url: &str,
        source: &D,
        credentials: Credentials,
    ) -> Result<CopyReport, CopyError> {
        let console = ConsoleClient::new(&self.transport, console_url)?;

        info!(stage = "authenticating", "copy started");
        let token = {
            let credentials = credentials;
            console.authenticate(&credentials).await?
        };

        info!(stage = "negotiating target", "authenticated");
        let target = console
            .negotiate_upload_target(&token, &self.prompter)
            .await?;

        info!(stage = "initiating upload", length = source.length(), "upload target ready");
        let uploader = ResumableUploader::new(&self.transport, &self.sleeper, self.policy);
        let session = uploader.initiate(&target, source.length()).await?;

        info!(stage = "uploading", "resumable session opened");
        let upload = uploader.upload(&session, source).await?;

        let crc32 = source.crc32().await.map_err(CopyError::Source)?;
        info!(stage = "triggering import", crc32, "upload finished");
        console.trigger_import(&token, crc32).await?;

        info!(stage = "done", bytes = upload.bytes, "import triggered");
        Ok(CopyReport {
            bytes: upload.bytes,
            failed_rounds: upload.failed_rounds,
            crc32,
        })
    }
}
