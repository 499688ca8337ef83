//! Domain types shared between the Graph adapter and its callers
//!
//! - [`Item`] - normalized remote file-system entry
//! - [`DeltaPage`] / [`DeltaContinuation`] - one page of the change feed
//! - [`UploadSession`] / [`UploadSessionStatus`] - resumable upload state
//! - [`DomainError`] - validation errors raised before any network call

pub mod delta;
pub mod errors;
pub mod item;
pub mod upload;

// Re-export commonly used types
pub use delta::{DeltaContinuation, DeltaPage, DeltaSync};
pub use errors::DomainError;
pub use item::{validate_name, DriveId, Item, ItemRef};
pub use upload::{ByteRange, UploadSession, UploadSessionStatus};
