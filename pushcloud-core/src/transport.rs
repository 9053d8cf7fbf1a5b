use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use reqwest::{Body, Client, Method, StatusCode};
use thiserror::Error;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Notify;
use tokio_util::io::ReaderStream;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("no network activity for {idle:?}")]
    Stalled { idle: Duration },
}

pub enum RequestBody {
    Empty,
    Bytes(Vec<u8>),
    /// Streamed body of exactly `length` bytes.
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: u64,
    },
}

impl RequestBody {
    pub fn len(&self) -> u64 {
        match self {
            RequestBody::Empty => 0,
            RequestBody::Bytes(bytes) => bytes.len() as u64,
            RequestBody::Reader { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            RequestBody::Reader { length, .. } => write!(f, "Reader({length} bytes)"),
        }
    }
}

#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn json<T: serde::Serialize>(self, payload: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(payload)?;
        Ok(self
            .header(
                reqwest::header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .body(RequestBody::Bytes(bytes)))
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

/// Issues one HTTP exchange. Timeouts and broken connections surface as `Err`.
pub trait HttpTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;
}

const MAX_REDIRECTS: usize = 10;

/// reqwest-backed transport. There is no limit on the total duration of an
/// exchange; it fails once no bytes have moved in either direction for the
/// idle timeout, so a slow but steady upload round is never cut short.
#[derive(Clone)]
pub struct ReqwestTransport {
    http: Client,
    idle_timeout: Duration,
}

impl ReqwestTransport {
    pub fn with_idle_timeout(idle_timeout: Duration) -> Result<Self, TransportError> {
        let http = Client::builder()
            .connect_timeout(idle_timeout)
            .redirect(redirect_policy())
            .build()?;
        Ok(Self { http, idle_timeout })
    }
}

/// 308 is "resume incomplete" in the upload protocol, never a redirect.
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.status() == StatusCode::PERMANENT_REDIRECT {
            attempt.stop()
        } else if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

/// Signals `activity` whenever the wrapped body yields bytes.
struct ActivityReader<R> {
    inner: R,
    activity: Arc<Notify>,
}

impl<R: AsyncRead + Unpin> AsyncRead for ActivityReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let before = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            self.activity.notify_one();
        }
        poll
    }
}

impl ReqwestTransport {
    async fn exchange(
        &self,
        request: HttpRequest,
        activity: Arc<Notify>,
    ) -> Result<HttpResponse, TransportError> {
        let builder = self
            .http
            .request(request.method, request.url)
            .headers(request.headers);
        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes),
            RequestBody::Reader { reader, .. } => {
                let reader = ActivityReader {
                    inner: reader,
                    activity: Arc::clone(&activity),
                };
                builder.body(Body::wrap_stream(ReaderStream::new(reader)))
            }
        };
        let mut response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            activity.notify_one();
            body.extend_from_slice(&chunk);
        }
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let activity = Arc::new(Notify::new());
        let exchange = self.exchange(request, Arc::clone(&activity));
        tokio::pin!(exchange);
        loop {
            tokio::select! {
                result = &mut exchange => return result,
                _ = activity.notified() => {}
                _ = tokio::time::sleep(self.idle_timeout) => {
                    return Err(TransportError::Stalled {
                        idle: self.idle_timeout,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const IDLE: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn streams_reader_body_with_declared_length() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/chunk"))
            .and(header("content-length", "7"))
            .and(body_bytes(b"payload"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-echo", "ok"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::with_idle_timeout(IDLE).unwrap();
        let url = Url::parse(&format!("{}/chunk", server.uri())).unwrap();
        let request = HttpRequest::new(Method::PUT, url)
            .header(reqwest::header::CONTENT_LENGTH, HeaderValue::from(7u64))
            .body(RequestBody::Reader {
                reader: Box::new(&b"payload"[..]),
                length: 7,
            });
        let response = transport.send(request).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.header_str("x-echo"), Some("ok"));
    }

    #[tokio::test]
    async fn resume_incomplete_is_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(308)
                    .insert_header("location", "/elsewhere")
                    .insert_header("range", "bytes=0-9"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::with_idle_timeout(IDLE).unwrap();
        let url = Url::parse(&format!("{}/upload", server.uri())).unwrap();
        let response = transport
            .send(HttpRequest::new(Method::PUT, url))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::PERMANENT_REDIRECT);
        assert_eq!(response.header_str("range"), Some("bytes=0-9"));
    }

    #[tokio::test]
    async fn silent_server_is_reported_as_stalled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let idle = Duration::from_millis(100);
        let transport = ReqwestTransport::with_idle_timeout(idle).unwrap();
        let url = Url::parse(&format!("{}/slow", server.uri())).unwrap();
        let err = transport
            .send(HttpRequest::new(Method::GET, url))
            .await
            .expect_err("expected stall");

        assert!(matches!(err, TransportError::Stalled { idle: reported } if reported == idle));
    }

    #[tokio::test]
    async fn steady_upload_outlives_idle_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/upload"))
            .and(header("content-length", "100"))
            .and(body_bytes(vec![b'z'; 100]))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let (mut writer, reader) = tokio::io::duplex(64);
        let feeder = tokio::spawn(async move {
            for _ in 0..10 {
                writer.write_all(&[b'z'; 10]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        // The body takes about a second to stream, twice the idle timeout.
        let transport = ReqwestTransport::with_idle_timeout(Duration::from_millis(500)).unwrap();
        let url = Url::parse(&format!("{}/upload", server.uri())).unwrap();
        let request = HttpRequest::new(Method::PUT, url)
            .header(reqwest::header::CONTENT_LENGTH, HeaderValue::from(100u64))
            .body(RequestBody::Reader {
                reader: Box::new(reader),
                length: 100,
            });
        let response = transport.send(request).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        feeder.await.unwrap();
    }

    #[test]
    fn json_body_sets_content_type() {
        let url = Url::parse("http://localhost/import").unwrap();
        let request = HttpRequest::new(Method::POST, url)
            .json(&serde_json::json!({ "Copy": true }))
            .unwrap();

        assert_eq!(
            request.headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(request.body.len(), 13);
    }
}
