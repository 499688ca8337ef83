//! Normalized remote file-system entries
//!
//! [`Item`] is the provider-agnostic record produced from every drive item
//! the Graph API returns. It is built once by a pure conversion in the
//! adapter crate and is not mutated afterwards, except by the delta
//! normalization pipeline while that pipeline still owns the batch.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Checks that `name` can be used as a single path segment under a parent
///
/// # Errors
/// Returns [`DomainError::InvalidName`] for empty names, `.`/`..`, and names
/// containing a path separator.
pub fn validate_name(name: &str) -> Result<(), DomainError> {
    if name.is_empty() {
        return Err(DomainError::InvalidName("name cannot be empty".to_string()));
    }
    if name == "." || name == ".." {
        return Err(DomainError::InvalidName(format!(
            "{name:?} is not a valid item name"
        )));
    }
    if name.contains(['/', '\\']) {
        return Err(DomainError::InvalidName(format!(
            "{name:?} contains a path separator"
        )));
    }
    Ok(())
}

/// Drive identifier, case-normalized
///
/// The Graph API is inconsistent about the case of drive ids (the same drive
/// shows up as `b!AbC` and `b!abc` across endpoints), so every drive id is
/// lower-cased on construction and compared in that form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DriveId(String);

impl DriveId {
    /// Creates a drive id, lower-casing the input
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().to_lowercase())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the empty id
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for DriveId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DriveId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for DriveId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<DriveId> for String {
    fn from(id: DriveId) -> Self {
        id.0
    }
}

/// Address of an item: the drive it lives in and its id within that drive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub drive_id: DriveId,
    pub item_id: String,
}

impl ItemRef {
    pub fn new(drive_id: impl Into<DriveId>, item_id: impl Into<String>) -> Self {
        Self {
            drive_id: drive_id.into(),
            item_id: item_id.into(),
        }
    }
}

/// A normalized remote file-system entry
///
/// The `download_url` is a short-lived pre-authenticated link. It is never
/// serialized and the `Debug` output redacts it, so items can be logged or
/// persisted without leaking credentials.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Item {
    /// Item id within its drive
    pub id: String,
    /// File or folder name, percent-decoded during delta normalization
    pub name: String,
    /// Drive that owns the item
    pub drive_id: DriveId,
    /// Parent folder id (None for the drive root)
    pub parent_id: Option<String>,
    /// Drive that owns the parent folder
    pub parent_drive_id: DriveId,
    pub is_folder: bool,
    pub is_deleted: bool,
    /// Compound items (e.g. OneNote notebooks) that are not plain files
    pub is_package: bool,
    pub size: u64,
    /// Freshness tag covering metadata and content
    pub etag: String,
    /// Freshness tag covering content only
    pub ctag: String,
    pub quick_xor_hash: String,
    pub sha1_hash: String,
    pub sha256_hash: String,
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Number of direct children for folders; `None` when the API omits it
    pub child_count: Option<u64>,
    /// Id of the shared item this entry aliases, when it is a remote item
    pub remote_id: Option<String>,
    /// Drive of the shared item this entry aliases
    pub remote_drive_id: Option<DriveId>,
    #[serde(skip)]
    pub download_url: Option<String>,
}

impl Item {
    /// Returns true if any content hash is populated
    #[must_use]
    pub fn has_hashes(&self) -> bool {
        !self.quick_xor_hash.is_empty() || !self.sha1_hash.is_empty() || !self.sha256_hash.is_empty()
    }

    /// Blanks every content hash
    pub fn clear_hashes(&mut self) {
        self.quick_xor_hash.clear();
        self.sha1_hash.clear();
        self.sha256_hash.clear();
    }

    /// Address of this item
    #[must_use]
    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.drive_id.clone(), self.id.clone())
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("drive_id", &self.drive_id)
            .field("parent_id", &self.parent_id)
            .field("parent_drive_id", &self.parent_drive_id)
            .field("is_folder", &self.is_folder)
            .field("is_deleted", &self.is_deleted)
            .field("is_package", &self.is_package)
            .field("size", &self.size)
            .field("etag", &self.etag)
            .field("ctag", &self.ctag)
            .field("quick_xor_hash", &self.quick_xor_hash)
            .field("sha1_hash", &self.sha1_hash)
            .field("sha256_hash", &self.sha256_hash)
            .field("created_at", &self.created_at)
            .field("modified_at", &self.modified_at)
            .field("child_count", &self.child_count)
            .field("remote_id", &self.remote_id)
            .field("remote_drive_id", &self.remote_drive_id)
            .field(
                "download_url",
                &self.download_url.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
