use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::client::{BearerToken, ConsoleClient, parse_json};
use crate::credentials::Credentials;
use crate::error::{CopyError, Stage};
use crate::transport::{HttpRequest, HttpTransport};

const AUTH_PATH: &str = "/import/auth";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    #[serde(rename = "Token")]
    token: String,
}

impl<T: HttpTransport> ConsoleClient<'_, T> {
    /// Exchanges username and password for a bearer token. Never retried.
    ///
    /// The encoded `Basic` value is wiped as soon as the header is built. The
    /// header itself is only marked sensitive: the copy handed to the HTTP
    /// stack cannot be wiped, but it is never logged and is freed when the
    /// exchange returns.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<BearerToken, CopyError> {
        let stage = Stage::Authorization;
        let url = self.endpoint(AUTH_PATH)?;
        let authorization = {
            let basic = credentials.basic_auth_value();
            let mut value = HeaderValue::from_str(basic.as_str())
                .map_err(|_| CopyError::InvalidCredentials)?;
            value.set_sensitive(true);
            value
        };
        debug!(username = credentials.username(), "authenticating");
        let request = HttpRequest::new(Method::POST, url).header(AUTHORIZATION, authorization);
        let response = self.exchange(stage, request).await?;
        match response.status {
            status if status.is_success() => {
                let payload: AuthResponse = parse_json(stage, &response)?;
                Ok(BearerToken::new(payload.token))
            }
            StatusCode::UNAUTHORIZED => Err(CopyError::InvalidCredentials),
            StatusCode::FORBIDDEN => Err(CopyError::InsufficientPrivileges),
            status => Err(CopyError::unexpected(stage, status)),
        }
    }
}
