use std::fmt;

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{CopyError, Stage};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Bearer token issued by the console. Lives for one copy only.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub(crate) fn header_value(&self, stage: Stage) -> Result<HeaderValue, CopyError> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.0))
            .map_err(|_| CopyError::malformed(stage, "token is not a valid header value"))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// The console side of the protocol: authentication, upload target
/// negotiation and the import trigger.
pub struct ConsoleClient<'a, T> {
    transport: &'a T,
    base_url: Url,
}

impl<'a, T: HttpTransport> ConsoleClient<'a, T> {
    pub fn new(transport: &'a T, console_url: &str) -> Result<Self, CopyError> {
        Ok(Self {
            transport,
            base_url: Url::parse(console_url)?,
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, CopyError> {
        Ok(self.base_url.join(path)?)
    }

    pub(crate) async fn exchange(
        &self,
        stage: Stage,
        request: HttpRequest,
    ) -> Result<HttpResponse, CopyError> {
        let request = request.header(ACCEPT, HeaderValue::from_static("application/json"));
        self.transport
            .send(request)
            .await
            .map_err(|source| CopyError::Request { stage, source })
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(
    stage: Stage,
    response: &HttpResponse,
) -> Result<T, CopyError> {
    serde_json::from_slice(&response.body)
        .map_err(|err| CopyError::malformed(stage, format!("invalid JSON body: {err}")))
}

pub(crate) fn authorized(
    request: HttpRequest,
    stage: Stage,
    token: &BearerToken,
) -> Result<HttpRequest, CopyError> {
    Ok(request.header(AUTHORIZATION, token.header_value(stage)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_debug_is_redacted() {
        let token = BearerToken::new("abc");
        assert_eq!(format!("{token:?}"), "BearerToken(<redacted>)");
    }

    #[test]
    fn bearer_header_is_sensitive() {
        let value = BearerToken::new("abc")
            .header_value(Stage::TriggeringImport)
            .unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());
    }
}
