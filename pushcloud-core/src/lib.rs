mod auth;
mod backoff;
mod client;
mod copier;
mod credentials;
mod error;
mod import;
mod prompt;
mod source;
mod target;
mod transport;
mod upload;

pub use backoff::{Backoff, RetryPolicy, Sleeper, TokioSleeper};
pub use client::{BearerToken, ConsoleClient};
pub use copier::{CopyReport, Copier};
pub use credentials::Credentials;
pub use error::{CopyError, Stage};
pub use prompt::{Prompter, parse_consent};
pub use source::{DumpSource, FileSource};
pub use target::{OverwriteConsent, TargetOutcome};
pub use transport::{
    HttpRequest, HttpResponse, HttpTransport, RequestBody, ReqwestTransport, TransportError,
};
pub use upload::{RESUME_INCOMPLETE, ResumableUploader, UploadReport, UploadSession, UploadTarget};
