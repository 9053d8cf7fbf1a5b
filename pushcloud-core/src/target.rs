use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::client::{BearerToken, ConsoleClient, authorized, parse_json};
use crate::error::{CopyError, Stage};
use crate::prompt::Prompter;
use crate::transport::{HttpRequest, HttpTransport};
use crate::upload::UploadTarget;

const IMPORT_PATH: &str = "/import";

/// Whether the user has agreed to replace an existing remote database.
/// Consent can be given once per copy; there is no state past `ConfirmedOnce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteConsent {
    Unconfirmed,
    ConfirmedOnce,
}

#[derive(Debug)]
pub enum TargetOutcome {
    Ready(UploadTarget),
    /// A database already exists remotely and consent has not been given yet.
    ExistingDatabase,
}

#[derive(Debug, Serialize)]
struct TargetRequest {
    #[serde(rename = "Copy")]
    copy: bool,
    #[serde(rename = "Confirmed", skip_serializing_if = "Option::is_none")]
    confirmed: Option<bool>,
}

impl TargetRequest {
    fn new(consent: OverwriteConsent) -> Self {
        Self {
            copy: true,
            confirmed: match consent {
                OverwriteConsent::Unconfirmed => None,
                OverwriteConsent::ConfirmedOnce => Some(true),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct TargetResponse {
    #[serde(rename = "SignedURI")]
    signed_uri: Url,
}

impl<T: HttpTransport> ConsoleClient<'_, T> {
    pub async fn request_upload_target(
        &self,
        token: &BearerToken,
        consent: OverwriteConsent,
    ) -> Result<TargetOutcome, CopyError> {
        let stage = Stage::InitiatingUploadTarget;
        let url = self.endpoint(IMPORT_PATH)?;
        let request = HttpRequest::new(Method::POST, url)
            .json(&TargetRequest::new(consent))
            .map_err(|err| CopyError::malformed(stage, err.to_string()))?;
        let request = authorized(request, stage, token)?;

        debug!(?consent, "requesting upload target");
        let response = self.exchange(stage, request).await?;
        match (response.status, consent) {
            (status, _) if status.is_success() => {
                let payload: TargetResponse = parse_json(stage, &response)?;
                Ok(TargetOutcome::Ready(UploadTarget::new(payload.signed_uri)))
            }
            (StatusCode::UNAUTHORIZED, _) => Err(CopyError::TokenInvalid),
            (StatusCode::CONFLICT, OverwriteConsent::Unconfirmed) => {
                Ok(TargetOutcome::ExistingDatabase)
            }
            (status, _) => Err(CopyError::unexpected(stage, status)),
        }
    }

    /// Obtains the signed upload destination, asking the user at most once
    /// whether an existing remote database may be overwritten.
    pub async fn negotiate_upload_target<P: Prompter>(
        &self,
        token: &BearerToken,
        prompter: &P,
    ) -> Result<UploadTarget, CopyError> {
        match self
            .request_upload_target(token, OverwriteConsent::Unconfirmed)
            .await?
        {
            TargetOutcome::Ready(target) => return Ok(target),
            TargetOutcome::ExistingDatabase => {}
        }

        info!("remote database is not empty, asking for consent to overwrite");
        let username = prompter
            .prompt_line("Username of the existing remote database: ")
            .map_err(CopyError::Prompt)?;
        let question = format!(
            "The database owned by '{}' is not empty. Overwrite it with this dump? (y/N) ",
            username.trim()
        );
        if !prompter.confirm(&question).map_err(CopyError::Prompt)? {
            return Err(CopyError::NoConsentToOverwrite);
        }

        match self
            .request_upload_target(token, OverwriteConsent::ConfirmedOnce)
            .await?
        {
            TargetOutcome::Ready(target) => Ok(target),
            TargetOutcome::ExistingDatabase => Err(CopyError::unexpected(
                Stage::InitiatingUploadTarget,
                StatusCode::CONFLICT,
            )),
        }
    }
}
