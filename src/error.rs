//! Error types for the harvest pipeline.
//!
//! Per-candidate errors (`FetchError`, `DecodeError`) are recorded in the run
//! summary and never abort a run. `StoreError` is classified as fatal,
//! transient, or a plain per-item failure. `RunFatalError` ends a run and maps
//! to a distinct process exit status.

use thiserror::Error;

/// Error fetching a URL over HTTP.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// URL the failed request was made against.
    pub fn url(&self) -> &str {
        match self {
            FetchError::Status { url, .. }
            | FetchError::Timeout { url }
            | FetchError::Transport { url, .. } => url,
        }
    }

    /// Whether retrying the request could plausibly succeed.
    ///
    /// 429 and 5xx responses, timeouts and connection-level failures are
    /// transient. Every other status fails immediately.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Timeout { .. } => true,
            FetchError::Transport { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
        }
    }
}

/// Image data could not be decoded.
#[derive(Debug, Error)]
#[error("failed to decode image: {0}")]
pub struct DecodeError(#[from] pub image::ImageError);

/// Errors from a destination store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("access denied: {0}")]
    Unauthorized(String),

    #[error("insufficient space: {0}")]
    InsufficientSpace(String),

    #[error("temporarily unavailable: {0}")]
    Transient(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl StoreError {
    /// Errors after which no further store operation can succeed this run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::Unauthorized(_) | StoreError::InsufficientSpace(_)
        )
    }

    /// Errors worth retrying within the upload budget.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Errors that end a run early.
#[derive(Debug, Error)]
pub enum RunFatalError {
    #[error("source page unreachable: {0}")]
    PageUnreachable(#[source] FetchError),

    #[error("destination credential invalid: {0}")]
    CredentialInvalid(#[source] StoreError),

    #[error("destination store unreachable: {0}")]
    StoreUnreachable(#[source] StoreError),

    #[error("upload of {name} failed fatally: {source}")]
    Upload {
        name: String,
        #[source]
        source: StoreError,
    },
}

impl RunFatalError {
    /// Process exit status for a run that ended on this error.
    pub const EXIT_STATUS: u8 = 2;

    /// Classify a store error raised while the run is starting up.
    pub fn from_startup(err: StoreError) -> Self {
        if matches!(err, StoreError::Unauthorized(_)) {
            RunFatalError::CredentialInvalid(err)
        } else {
            RunFatalError::StoreUnreachable(err)
        }
    }
}
