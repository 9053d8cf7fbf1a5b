use reqwest::{Method, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::client::{BearerToken, ConsoleClient, authorized};
use crate::error::{CopyError, Stage};
use crate::transport::{HttpRequest, HttpTransport};

const UPLOAD_COMPLETE_PATH: &str = "/import/upload-complete";

#[derive(Debug, Serialize)]
struct UploadComplete {
    #[serde(rename = "Crc32")]
    crc32: u32,
}

impl<T: HttpTransport> ConsoleClient<'_, T> {
    /// Tells the console the dump is uploaded and the import may start.
    pub async fn trigger_import(&self, token: &BearerToken, crc32: u32) -> Result<(), CopyError> {
        let stage = Stage::TriggeringImport;
        let url = self.endpoint(UPLOAD_COMPLETE_PATH)?;
        let request = HttpRequest::new(Method::POST, url)
            .json(&UploadComplete { crc32 })
            .map_err(|err| CopyError::malformed(stage, err.to_string()))?;
        let request = authorized(request, stage, token)?;

        debug!(crc32, "triggering import");
        let response = self.exchange(stage, request).await?;
        match response.status {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CopyError::DatabaseAlreadyExists),
            status => Err(CopyError::unexpected(stage, status)),
        }
    }
}
