//! Error taxonomy for the Graph data-plane
//!
//! Two predicates drive every retry decision in the crate and are kept
//! deliberately separate:
//!
//! - [`classify`] answers "is this status an error, and which kind". It is
//!   broad: every status `>= 500` is a [`ErrorKind::ServerError`].
//! - [`is_retryable`] answers "is another attempt worth it". It is narrow and
//!   explicit: 507 (quota) and the other 5xx codes above 504 describe
//!   persistent conditions and are surfaced immediately.

use std::fmt;

use onesync_core::domain::DomainError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Longest body excerpt rendered by `Display`; the full body stays in [`ApiError::body`].
const BODY_EXCERPT_LEN: usize = 512;

/// Sentinel classification of an HTTP failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    /// Name collision or concurrent modification
    Conflict,
    /// The resource (typically a delta token) no longer exists
    Gone,
    /// Upload session state diverged from the ranges that were sent
    RangeNotSatisfiable,
    Locked,
    Throttled,
    ServerError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadRequest => "bad request",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::Gone => "gone",
            Self::RangeNotSatisfiable => "range not satisfiable",
            Self::Locked => "locked",
            Self::Throttled => "throttled",
            Self::ServerError => "server error",
        };
        f.write_str(name)
    }
}

/// Maps an HTTP status to its sentinel, or `None` when the status is not an
/// error at this layer (2xx, 3xx and unmapped 4xx).
pub fn classify(status: StatusCode) -> Option<ErrorKind> {
    let kind = match status.as_u16() {
        400 => ErrorKind::BadRequest,
        401 => ErrorKind::Unauthorized,
        403 => ErrorKind::Forbidden,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        410 => ErrorKind::Gone,
        416 => ErrorKind::RangeNotSatisfiable,
        423 => ErrorKind::Locked,
        429 => ErrorKind::Throttled,
        s if s >= 500 => ErrorKind::ServerError,
        _ => return None,
    };
    Some(kind)
}

/// Returns true for the statuses worth another attempt: 408, 429, 500, 502,
/// 503, 504 and the vendor-specific 509.
pub fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504 | 509)
}

/// Extracts the correlation id Graph attaches to every response
pub(crate) fn request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("request-id")
        .or_else(|| headers.get("client-request-id"))
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// A terminal HTTP failure returned by the Graph API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    /// Value of the `request-id` response header, for support correlation
    pub request_id: Option<String>,
    /// Raw response body
    pub body: String,
    pub kind: Option<ErrorKind>,
}

/// `{"error": {"code": ..., "message": ...}}` envelope used by Graph
#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphErrorBody,
}

#[derive(Debug, Deserialize)]
struct GraphErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, request_id: Option<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            request_id,
            body: body.into(),
            kind: classify(status),
        }
    }

    /// The machine-readable `error.code` from the body, if the body is a Graph error envelope
    pub fn graph_code(&self) -> Option<String> {
        serde_json::from_str::<GraphErrorEnvelope>(&self.body)
            .ok()
            .and_then(|e| e.error.code)
    }

    /// The human-readable `error.message` from the body, if present
    pub fn graph_message(&self) -> Option<String> {
        serde_json::from_str::<GraphErrorEnvelope>(&self.body)
            .ok()
            .and_then(|e| e.error.message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status.as_u16())?;
        if let Some(kind) = self.kind {
            write!(f, " ({kind})")?;
        }
        if let Some(ref id) = self.request_id {
            write!(f, " request-id={id}")?;
        }
        if !self.body.is_empty() {
            let excerpt: String = self.body.chars().take(BODY_EXCERPT_LEN).collect();
            write!(f, ": {excerpt}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

/// Errors that can occur when talking to the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Non-retryable HTTP status, or a retryable one after retries ran out
    #[error("Graph API error: {0}")]
    Api(ApiError),

    /// DNS, TCP or TLS failure on every attempt
    #[error("Network error after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    /// The response arrived but its body could not be read
    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The token supplier failed; never retried
    #[error("Failed to obtain access token: {0}")]
    Token(#[source] anyhow::Error),

    /// The caller's cancellation token fired
    #[error("Operation cancelled")]
    Cancelled,

    /// Caller input rejected before any network call
    #[error("Invalid request: {0}")]
    Validation(String),

    /// `fetch_all` hit its page ceiling without reaching a terminal page
    #[error("Delta pagination exceeded {max_pages} pages")]
    PaginationExceeded { max_pages: usize },

    /// HTTP 410 on a delta request: discard the token and restart from empty
    #[error("Delta token expired, a full resync is required ({0})")]
    DeltaTokenExpired(ApiError),

    /// HTTP 416 on an upload chunk: query the session status and resume
    #[error("Upload session rejected the chunk range ({0})")]
    UploadRangeMismatch(ApiError),

    /// A success status the protocol step does not allow
    #[error("Unexpected response status {0}")]
    UnexpectedStatus(StatusCode),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Reading from an upload source or writing a download failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    /// The sentinel classification, if this failure has one
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api(e) => e.kind,
            Self::DeltaTokenExpired(_) => Some(ErrorKind::Gone),
            Self::UploadRangeMismatch(_) => Some(ErrorKind::RangeNotSatisfiable),
            _ => None,
        }
    }

    /// `is`-style sentinel check, e.g. `err.is(ErrorKind::Conflict)`
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    /// The HTTP status behind this error, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api(e) | Self::DeltaTokenExpired(e) | Self::UploadRangeMismatch(e) => {
                Some(e.status)
            }
            Self::UnexpectedStatus(status) => Some(*status),
            _ => None,
        }
    }

    /// The underlying HTTP error details, if any
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(e) | Self::DeltaTokenExpired(e) | Self::UploadRangeMismatch(e) => Some(e),
            _ => None,
        }
    }

    /// True if the failure class is transient: network failures and the
    /// retryable status set. Such errors only reach callers once retries ran out.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Api(e) => is_retryable(e.status),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<DomainError> for GraphError {
    fn from(err: DomainError) -> Self {
        Self::Validation(err.to_string())
    }
}
