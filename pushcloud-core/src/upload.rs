//! Resumable upload of the dump to the signed destination.
//!
//! After any failed round the client cannot know how many bytes the server
//! kept, so the next round always starts with a position probe
//! (`Content-Range: bytes */{length}`) and resumes from what the server
//! reports.

use std::fmt;

use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderName, HeaderValue, LOCATION, RANGE};
use reqwest::{Method, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::{RetryPolicy, Sleeper};
use crate::error::{CopyError, Stage};
use crate::source::DumpSource;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Status the storage service uses for "resume incomplete".
pub const RESUME_INCOMPLETE: u16 = 308;

const RESUMABLE_MARKER: &str = "x-goog-resumable";

/// Signed destination handed out by the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    signed_uri: Url,
}

impl UploadTarget {
    pub fn new(signed_uri: Url) -> Self {
        Self { signed_uri }
    }

    pub fn signed_uri(&self) -> &Url {
        &self.signed_uri
    }
}

/// Resumable endpoint for one upload. Reused by every retry round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    location: Url,
    length: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub bytes: u64,
    pub failed_rounds: u32,
}

#[derive(Debug)]
enum RoundFailure {
    Transport(TransportError),
    Status(StatusCode),
}

impl fmt::Display for RoundFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoundFailure::Transport(err) => write!(f, "{err}"),
            RoundFailure::Status(status) => write!(f, "status {status}"),
        }
    }
}

#[derive(Debug)]
enum Step {
    Finished,
    Resume { received: u64 },
    Failed(RoundFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    Transfer,
    Probe,
}

pub struct ResumableUploader<'a, T, S> {
    transport: &'a T,
    sleeper: &'a S,
    policy: RetryPolicy,
}

impl<'a, T: HttpTransport, S: Sleeper> ResumableUploader<'a, T, S> {
    pub fn new(transport: &'a T, sleeper: &'a S, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    /// Opens a resumable session on the signed destination.
    pub async fn initiate(
        &self,
        target: &UploadTarget,
        length: u64,
    ) -> Result<UploadSession, CopyError> {
        let stage = Stage::InitiatingUpload;
        let request = HttpRequest::new(Method::POST, target.signed_uri.clone())
            .header(CONTENT_LENGTH, HeaderValue::from(0u64))
            .header(
                HeaderName::from_static(RESUMABLE_MARKER),
                HeaderValue::from_static("start"),
            );
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|source| CopyError::Request { stage, source })?;
        if response.status != StatusCode::CREATED {
            return Err(CopyError::unexpected(stage, response.status));
        }
        let location = response
            .header_str(LOCATION.as_str())
            .ok_or_else(|| CopyError::malformed(stage, "missing Location header"))?;
        let location = target.signed_uri.join(location)?;
        debug!(%location, length, "resumable session created");
        Ok(UploadSession { location, length })
    }

    /// Uploads the whole source, resuming after failures until the server
    /// confirms completion or the retry ceiling is hit.
    pub async fn upload<D: DumpSource>(
        &self,
        session: &UploadSession,
        source: &D,
    ) -> Result<UploadReport, CopyError> {
        let mut position = 0u64;
        let mut failed_rounds = 0u32;
        let mut round = Round::Transfer;

        loop {
            let step = match round {
                Round::Transfer => self.transfer(session, source, position).await?,
                Round::Probe => self.probe(session).await?,
            };
            match step {
                Step::Finished => {
                    info!(bytes = session.length, failed_rounds, "upload complete");
                    return Ok(UploadReport {
                        bytes: session.length,
                        failed_rounds,
                    });
                }
                Step::Resume { received } => {
                    position = next_position(position, received, session.length);
                    info!(
                        position,
                        percent = percent(position, session.length),
                        "resuming upload"
                    );
                    round = Round::Transfer;
                }
                Step::Failed(failure) => {
                    failed_rounds = failed_rounds.saturating_add(1);
                    if failed_rounds > self.policy.max_attempts {
                        return Err(CopyError::UploadExhausted {
                            attempts: failed_rounds,
                        });
                    }
                    let delay = self.policy.delay_after(failed_rounds);
                    warn!(
                        ?round,
                        %failure,
                        attempt = failed_rounds,
                        delay_ms = delay.as_millis() as u64,
                        "upload round failed, backing off"
                    );
                    self.sleeper.sleep(delay).await;
                    round = Round::Probe;
                }
            }
        }
    }

    async fn transfer<D: DumpSource>(
        &self,
        session: &UploadSession,
        source: &D,
        position: u64,
    ) -> Result<Step, CopyError> {
        let length = session.length;
        let mut request = HttpRequest::new(Method::PUT, session.location.clone())
            .header(CONTENT_LENGTH, HeaderValue::from(length - position));
        if position >= length && length > 0 {
            // Everything is stored, only the finalisation is missing.
            request = request.header(CONTENT_RANGE, total_range(length)?);
        } else {
            if position > 0 {
                let range = format!("bytes {}-{}/{}", position, length - 1, length);
                request = request.header(CONTENT_RANGE, range_value(&range)?);
            }
            let body = source.read_from(position).await.map_err(CopyError::Source)?;
            request = request.body(body);
        }

        debug!(position, length, "sending upload round");
        Ok(match self.transport.send(request).await {
            Ok(response) if matches!(response.status, StatusCode::OK | StatusCode::CREATED) => {
                Step::Finished
            }
            Ok(response) => Step::Failed(RoundFailure::Status(response.status)),
            Err(err) => Step::Failed(RoundFailure::Transport(err)),
        })
    }

    async fn probe(&self, session: &UploadSession) -> Result<Step, CopyError> {
        let request = HttpRequest::new(Method::PUT, session.location.clone())
            .header(CONTENT_LENGTH, HeaderValue::from(0u64))
            .header(CONTENT_RANGE, total_range(session.length)?);
        Ok(match self.transport.send(request).await {
            Ok(response) => probe_step(&response),
            Err(err) => Step::Failed(RoundFailure::Transport(err)),
        })
    }
}

fn probe_step(response: &HttpResponse) -> Step {
    match response.status.as_u16() {
        RESUME_INCOMPLETE => {
            let received = match response.header_str(RANGE.as_str()) {
                Some(range) => parse_received(range).unwrap_or_else(|| {
                    warn!(range, "ignoring unparsable Range header");
                    0
                }),
                None => 0,
            };
            Step::Resume { received }
        }
        200 | 201 => Step::Finished,
        _ => Step::Failed(RoundFailure::Status(response.status)),
    }
}

/// Bytes the server holds according to a `Range: bytes=0-{last}` header.
fn parse_received(range: &str) -> Option<u64> {
    let (first, last) = range.trim().strip_prefix("bytes=")?.split_once('-')?;
    if first.trim() != "0" {
        return None;
    }
    last.trim().parse::<u64>().ok()?.checked_add(1)
}

fn next_position(current: u64, received: u64, length: u64) -> u64 {
    if received < current {
        warn!(current, received, "server reported a smaller offset, keeping confirmed one");
    }
    received.max(current).min(length)
}

fn total_range(length: u64) -> Result<HeaderValue, CopyError> {
    range_value(&format!("bytes */{length}"))
}

fn range_value(value: &str) -> Result<HeaderValue, CopyError> {
    HeaderValue::from_str(value)
        .map_err(|_| CopyError::malformed(Stage::Uploading, format!("bad range {value}")))
}

fn percent(position: u64, length: u64) -> u64 {
    if length == 0 {
        100
    } else {
        position.saturating_mul(100) / length
    }
}
