use std::fmt;
use std::io;

use reqwest::StatusCode;
use thiserror::Error;

use crate::transport::TransportError;

/// The protocol exchange a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authorization,
    InitiatingUploadTarget,
    InitiatingUpload,
    Uploading,
    TriggeringImport,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Authorization => "Authorization",
            Stage::InitiatingUploadTarget => "Initiating upload target",
            Stage::InitiatingUpload => "Initiating database upload",
            Stage::Uploading => "Uploading database",
            Stage::TriggeringImport => "Triggering import",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CopyError {
    #[error("Invalid username/password credentials")]
    InvalidCredentials,
    #[error(
        "The given credentials do not have administrative access to the target database"
    )]
    InsufficientPrivileges,
    #[error(
        "The authorization token is invalid or has expired, re-run the command to authenticate again"
    )]
    TokenInvalid,
    #[error("No consent to overwrite the existing database, aborting the copy")]
    NoConsentToOverwrite,
    #[error(
        "A non-empty database already exists at the target, it must be emptied before a dump can be imported"
    )]
    DatabaseAlreadyExists,
    #[error("Upload failed after numerous attempts ({attempts} failed rounds)")]
    UploadExhausted { attempts: u32 },
    #[error("Unexpected response code {status} from request: {stage}")]
    UnexpectedResponse { stage: Stage, status: StatusCode },
    #[error("{stage} request could not be completed")]
    Request {
        stage: Stage,
        #[source]
        source: TransportError,
    },
    #[error("malformed response from request: {stage}: {reason}")]
    MalformedResponse { stage: Stage, reason: String },
    #[error("failed to read dump")]
    Source(#[source] io::Error),
    #[error("failed to read answer from the console")]
    Prompt(#[source] io::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

impl CopyError {
    pub(crate) fn unexpected(stage: Stage, status: StatusCode) -> Self {
        CopyError::UnexpectedResponse { stage, status }
    }

    pub(crate) fn malformed(stage: Stage, reason: impl Into<String>) -> Self {
        CopyError::MalformedResponse {
            stage,
            reason: reason.into(),
        }
    }

    /// The stage a failure was observed in, when it came from a server exchange.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            CopyError::InvalidCredentials | CopyError::InsufficientPrivileges => {
                Some(Stage::Authorization)
            }
            CopyError::TokenInvalid | CopyError::NoConsentToOverwrite => {
                Some(Stage::InitiatingUploadTarget)
            }
            CopyError::DatabaseAlreadyExists => Some(Stage::TriggeringImport),
            CopyError::UploadExhausted { .. } => Some(Stage::Uploading),
            CopyError::UnexpectedResponse { stage, .. }
            | CopyError::Request { stage, .. }
            | CopyError::MalformedResponse { stage, .. } => Some(*stage),
            CopyError::Source(_) | CopyError::Prompt(_) | CopyError::Url(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_response_names_stage_and_status() {
        let err = CopyError::unexpected(Stage::Authorization, StatusCode::INTERNAL_SERVER_ERROR);
        let message = err.to_string();
        assert!(message.contains("Unexpected response"));
        assert!(message.contains("Authorization"));
        assert!(message.contains("500"));
    }

    #[test]
    fn privilege_error_mentions_administrative_access() {
        assert!(
            CopyError::InsufficientPrivileges
                .to_string()
                .contains("administrative access")
        );
    }

    #[test]
    fn stage_is_reported_for_protocol_failures() {
        assert_eq!(
            CopyError::DatabaseAlreadyExists.stage(),
            Some(Stage::TriggeringImport)
        );
        assert_eq!(
            CopyError::UploadExhausted { attempts: 3 }.stage(),
            Some(Stage::Uploading)
        );
        assert_eq!(
            CopyError::Source(io::Error::other("gone")).stage(),
            None
        );
    }
}
