//! Resumable upload session types

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};

use super::errors::DomainError;

/// A server-side staging area for one large-file upload
///
/// `upload_url` embeds short-lived credentials, so it is redacted from the
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub upload_url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn new(upload_url: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            upload_url: upload_url.into(),
            expires_at,
        }
    }

    /// Returns true once the session's expiry time has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

impl fmt::Debug for UploadSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSession")
            .field("upload_url", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A byte range the server has not yet acknowledged
///
/// Graph reports these as `"start-end"` (inclusive) or `"start-"` when the
/// range runs to the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive end offset; `None` means "through the end of the file"
    pub end: Option<u64>,
}

impl ByteRange {
    /// Number of bytes covered, resolving an open end against `total`
    #[must_use]
    pub fn len(&self, total: u64) -> u64 {
        let end = self.end.map_or(total, |e| e.saturating_add(1).min(total));
        end.saturating_sub(self.start)
    }

    #[must_use]
    pub fn is_empty(&self, total: u64) -> bool {
        self.len(total) == 0
    }
}

impl FromStr for ByteRange {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidByteRange(s.to_string());

        let (start, end) = s.trim().split_once('-').ok_or_else(invalid)?;
        let start: u64 = start.parse().map_err(|_| invalid())?;
        let end = if end.is_empty() {
            None
        } else {
            let end: u64 = end.parse().map_err(|_| invalid())?;
            if end < start {
                return Err(invalid());
            }
            Some(end)
        };

        Ok(Self { start, end })
    }
}

impl Display for ByteRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// Server-side view of an in-progress upload session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSessionStatus {
    pub expires_at: Option<DateTime<Utc>>,
    /// Ranges still missing, in ascending order as reported by the server
    pub pending: Vec<ByteRange>,
}

impl UploadSessionStatus {
    /// Offset at which an interrupted transfer should resume
    #[must_use]
    pub fn resume_offset(&self) -> Option<u64> {
        self.pending.iter().map(|r| r.start).min()
    }
}
