//! onesync Graph - Microsoft Graph data-plane
//!
//! Turns rate-limited, paginated Graph calls into bounded operations a sync
//! engine can depend on:
//! - Error classification shared by every retry decision
//! - Authenticated and pre-authenticated retry transports
//! - Resumable chunked uploads
//! - Delta queries with page normalization
//! - Content download from pre-authenticated URLs
//!
//! ## Modules
//!
//! - [`error`] - [`GraphError`], [`ErrorKind`] and the status predicates
//! - [`retry`] - [`RetryPolicy`], backoff with jitter, `Retry-After` parsing
//! - [`client`] - [`GraphClient`], the authenticated transport
//! - [`preauth`] - transport for URLs that carry their own credentials
//! - [`source`] - [`UploadSource`] implementations
//! - [`upload`] - simple and resumable uploads
//! - [`delta`] - change feed pagination
//! - [`normalize`] - the per-page normalization pipeline
//! - [`download`] - item content download

pub mod client;
pub mod delta;
pub mod download;
mod drive_item;
pub mod error;
pub mod normalize;
pub mod preauth;
pub mod retry;
pub mod source;
pub mod upload;

pub use client::GraphClient;
pub use error::{classify, is_retryable, ApiError, ErrorKind, GraphError, Result};
pub use retry::RetryPolicy;
pub use source::{FileSource, UploadSource};
