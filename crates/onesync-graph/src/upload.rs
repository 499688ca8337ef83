//! Upload operations for Microsoft Graph API (OneDrive)
//!
//! [`upload`] picks the protocol by size:
//!
//! - up to `upload.simple_upload_max_bytes` (4 MiB by default): one
//!   authenticated `PUT .../content`, sent once and never replayed
//! - above it: a resumable upload session, fed in `upload.chunk_size_bytes`
//!   chunks through the pre-authenticated transport
//!
//! When any chunk fails (including cancellation) the session is deleted on a
//! best-effort basis. [`resume_upload`] is the lower-level entry point for a
//! caller that owns a session and wants to continue it after an interruption;
//! it leaves the session alone on failure.
//!
//! ## Microsoft Graph API References
//!
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)
//! - [Upload large files](https://learn.microsoft.com/en-us/graph/api/driveitem-createuploadsession)

use std::future::ready;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use onesync_core::config::CHUNK_ALIGNMENT;
use onesync_core::domain::{
    validate_name, ByteRange, Item, ItemRef, UploadSession, UploadSessionStatus,
};
use reqwest::header::{HeaderMap, CONTENT_RANGE, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{decode_json, encode_segment, GraphClient};
use crate::drive_item::GraphDriveItem;
use crate::error::{ErrorKind, GraphError, Result};
use crate::source::UploadSource;

const OCTET_STREAM: &str = "application/octet-stream";

/// Upper bound on the best-effort session DELETE
const CANCEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Progress callback: `(bytes_sent, total_bytes)`
pub type ProgressFn<'a> = dyn Fn(u64, u64) + Send + Sync + 'a;

/// Response from `createUploadSession` and from a session status query
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    upload_url: Option<String>,
    expiration_date_time: Option<String>,
    #[serde(default)]
    next_expected_ranges: Vec<String>,
}

impl UploadSessionResponse {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expiration_date_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn validate_parent(parent: &ItemRef) -> Result<()> {
    if parent.drive_id.is_empty() {
        return Err(GraphError::Validation("parent drive id is empty".to_string()));
    }
    if parent.item_id.is_empty() {
        return Err(GraphError::Validation("parent item id is empty".to_string()));
    }
    Ok(())
}

/// Builds `/drives/{drive}/items/{parent}:/{name}:{suffix}`
fn item_path(parent: &ItemRef, name: &str, suffix: &str) -> String {
    format!(
        "/drives/{}/items/{}:/{}:{}",
        encode_segment(parent.drive_id.as_str()),
        encode_segment(&parent.item_id),
        encode_segment(name),
        suffix
    )
}

/// Uploads `source` as `name` under `parent`, replacing any existing file.
///
/// # Errors
/// [`GraphError::Validation`] for a bad name or parent before any request;
/// [`GraphError::UploadRangeMismatch`] if the session rejects a chunk range;
/// otherwise the transport errors.
pub async fn upload(
    client: &GraphClient,
    parent: &ItemRef,
    name: &str,
    source: &dyn UploadSource,
    mtime: Option<DateTime<Utc>>,
    progress: Option<&ProgressFn<'_>>,
    cancel: &CancellationToken,
) -> Result<Item> {
    validate_name(name)?;
    validate_parent(parent)?;

    let size = source.len();
    let limits = client.upload_config();

    if size <= limits.simple_upload_max_bytes {
        let item = upload_simple(client, parent, name, source, mtime, cancel).await?;
        if let Some(cb) = progress {
            cb(size, size);
        }
        return Ok(item);
    }

    let chunk_size = limits.chunk_size_bytes;
    if chunk_size == 0 || chunk_size % CHUNK_ALIGNMENT != 0 {
        return Err(GraphError::Validation(format!(
            "chunk size {chunk_size} is not a non-zero multiple of {CHUNK_ALIGNMENT}"
        )));
    }

    info!(
        name,
        size,
        chunks = size.div_ceil(chunk_size),
        "Starting resumable upload"
    );

    let session = create_upload_session(client, parent, name, mtime, cancel).await?;
    match send_chunks(client, &session, source, 0, progress, cancel).await {
        Ok(item) => {
            info!(id = %item.id, name = %item.name, size = item.size, "Resumable upload completed");
            Ok(item)
        }
        Err(err) => {
            warn!(name, error = %err, "Resumable upload failed, cancelling session");
            cancel_session_best_effort(client, &session).await;
            Err(err)
        }
    }
}

/// Single-request upload; the body is sent exactly once
async fn upload_simple(
    client: &GraphClient,
    parent: &ItemRef,
    name: &str,
    source: &dyn UploadSource,
    mtime: Option<DateTime<Utc>>,
    cancel: &CancellationToken,
) -> Result<Item> {
    let size = source.len();
    debug!(name, size, "Starting simple upload");

    let body = source.view(0, size).await?;
    let response = client
        .execute_once(
            Method::PUT,
            &item_path(parent, name, "/content"),
            body,
            OCTET_STREAM,
            cancel,
        )
        .await?;
    let raw: GraphDriveItem = decode_json(response).await?;
    let mut item = Item::from(raw);

    if let Some(at) = mtime {
        let target = ItemRef::new(
            if item.drive_id.is_empty() {
                parent.drive_id.clone()
            } else {
                item.drive_id.clone()
            },
            item.id.clone(),
        );
        item = set_modified_time(client, &target, at, cancel).await?;
    }

    debug!(id = %item.id, name = %item.name, "Simple upload completed");
    Ok(item)
}

/// Sets `fileSystemInfo.lastModifiedDateTime` on an item and returns the updated item
pub async fn set_modified_time(
    client: &GraphClient,
    item: &ItemRef,
    mtime: DateTime<Utc>,
    cancel: &CancellationToken,
) -> Result<Item> {
    let path = format!(
        "/drives/{}/items/{}",
        encode_segment(item.drive_id.as_str()),
        encode_segment(&item.item_id)
    );
    let body = json!({
        "fileSystemInfo": { "lastModifiedDateTime": format_timestamp(&mtime) }
    });
    let raw: GraphDriveItem = client
        .execute_json(
            Method::PATCH,
            &path,
            Some(Bytes::from(body.to_string())),
            &HeaderMap::new(),
            cancel,
        )
        .await?;
    Ok(Item::from(raw))
}

/// Creates a resumable upload session for `name` under `parent`.
///
/// Conflicts are resolved by replacing the existing item. When `mtime` is set
/// it is recorded on the item once the upload completes.
pub async fn create_upload_session(
    client: &GraphClient,
    parent: &ItemRef,
    name: &str,
    mtime: Option<DateTime<Utc>>,
    cancel: &CancellationToken,
) -> Result<UploadSession> {
    validate_name(name)?;
    validate_parent(parent)?;

    let mut item = json!({ "@microsoft.graph.conflictBehavior": "replace" });
    if let Some(at) = mtime {
        item["fileSystemInfo"] = json!({ "lastModifiedDateTime": format_timestamp(&at) });
    }
    let body = json!({ "item": item });

    debug!(name, "Creating upload session");
    let response: UploadSessionResponse = client
        .execute_json(
            Method::POST,
            &item_path(parent, name, "/createUploadSession"),
            Some(Bytes::from(body.to_string())),
            &HeaderMap::new(),
            cancel,
        )
        .await?;

    let expires_at = response.expires_at();
    let upload_url = response
        .upload_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| GraphError::InvalidResponse("upload session has no uploadUrl".to_string()))?;

    debug!(name, expires_at = ?expires_at, "Upload session created");
    Ok(UploadSession::new(upload_url, expires_at))
}

/// Uploads `[offset, offset + len)` of `source` to the session.
///
/// Returns `Some(item)` when the server reports the upload complete and
/// `None` when it accepted the chunk and expects more.
///
/// # Errors
/// [`GraphError::UploadRangeMismatch`] on HTTP 416,
/// [`GraphError::UnexpectedStatus`] for a 2xx other than 200, 201 or 202.
pub async fn upload_chunk(
    client: &GraphClient,
    session: &UploadSession,
    source: &dyn UploadSource,
    offset: u64,
    len: u64,
    cancel: &CancellationToken,
) -> Result<Option<Item>> {
    if len == 0 {
        return Err(GraphError::Validation("chunk length is zero".to_string()));
    }
    let total = source.len();
    let end = offset + len - 1;
    let content_range = format!("bytes {offset}-{end}/{total}");
    let label = format!("upload chunk {offset}-{end}/{total}");

    debug!(content_range = %content_range, "Uploading chunk");

    let response = client
        .execute_preauth(
            &label,
            |http| {
                let request = http
                    .put(session.upload_url.as_str())
                    .header(CONTENT_RANGE, content_range.as_str())
                    .header(CONTENT_TYPE, OCTET_STREAM);
                async move {
                    let body = source.view(offset, len).await?;
                    Ok(request.body(body))
                }
            },
            cancel,
        )
        .await
        .map_err(|err| match err {
            GraphError::Api(api) if api.kind == Some(ErrorKind::RangeNotSatisfiable) => {
                warn!(content_range = %content_range, "Upload session rejected chunk range");
                GraphError::UploadRangeMismatch(api)
            }
            other => other,
        })?;

    match response.status() {
        StatusCode::ACCEPTED => {
            // Intermediate chunk; the body only echoes the pending ranges
            let _ = response.bytes().await;
            Ok(None)
        }
        StatusCode::OK | StatusCode::CREATED => {
            let raw: GraphDriveItem = decode_json(response).await?;
            Ok(Some(Item::from(raw)))
        }
        other => {
            let _ = response.bytes().await;
            Err(GraphError::UnexpectedStatus(other))
        }
    }
}

/// Sends every chunk from `start` to the end of `source`
async fn send_chunks(
    client: &GraphClient,
    session: &UploadSession,
    source: &dyn UploadSource,
    start: u64,
    progress: Option<&ProgressFn<'_>>,
    cancel: &CancellationToken,
) -> Result<Item> {
    let total = source.len();
    let chunk_size = client.upload_config().chunk_size_bytes;
    let mut offset = start;

    while offset < total {
        let len = chunk_size.min(total - offset);
        let completed = upload_chunk(client, session, source, offset, len, cancel).await?;
        offset += len;

        if let Some(cb) = progress {
            cb(offset, total);
        }

        if let Some(item) = completed {
            if offset < total {
                warn!(offset, total, "Upload session completed before the last chunk");
            }
            return Ok(item);
        }
    }

    Err(GraphError::InvalidResponse(
        "upload session accepted every chunk without returning the item".to_string(),
    ))
}

/// Queries the server-side state of an upload session
pub async fn query_upload_status(
    client: &GraphClient,
    session: &UploadSession,
    cancel: &CancellationToken,
) -> Result<UploadSessionStatus> {
    let response = client
        .execute_preauth(
            "upload session status",
            |http| ready(Ok(http.get(session.upload_url.as_str()))),
            cancel,
        )
        .await?;
    let raw: UploadSessionResponse = decode_json(response).await?;

    let pending = raw
        .next_expected_ranges
        .iter()
        .map(|r| r.parse::<ByteRange>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| GraphError::InvalidResponse(e.to_string()))?;

    Ok(UploadSessionStatus {
        expires_at: raw.expires_at(),
        pending,
    })
}

/// Continues an interrupted upload from the first byte the server is missing.
///
/// The caller owns `session`; it is not deleted when this fails, so the
/// caller can query and resume again.
pub async fn resume_upload(
    client: &GraphClient,
    session: &UploadSession,
    source: &dyn UploadSource,
    progress: Option<&ProgressFn<'_>>,
    cancel: &CancellationToken,
) -> Result<Item> {
    let status = query_upload_status(client, session, cancel).await?;
    let offset = status.resume_offset().ok_or_else(|| {
        GraphError::Validation("upload session reports no pending ranges".to_string())
    })?;

    let total = source.len();
    if offset >= total {
        return Err(GraphError::Validation(format!(
            "upload session expects offset {offset} but the source has {total} bytes"
        )));
    }

    info!(offset, total, "Resuming upload session");
    send_chunks(client, session, source, offset, progress, cancel).await
}

/// Deletes an upload session so the server discards its staged bytes.
///
/// Runs under its own cancellation scope, so it still goes out when the
/// operation that owned the session was cancelled.
pub async fn cancel_upload_session(client: &GraphClient, session: &UploadSession) -> Result<()> {
    let scope = CancellationToken::new();
    let response = client
        .execute_preauth(
            "cancel upload session",
            |http| ready(Ok(http.delete(session.upload_url.as_str()))),
            &scope,
        )
        .await?;
    let _ = response.bytes().await;
    Ok(())
}

async fn cancel_session_best_effort(client: &GraphClient, session: &UploadSession) {
    match tokio::time::timeout(CANCEL_TIMEOUT, cancel_upload_session(client, session)).await {
        Ok(Ok(())) => debug!("Upload session cancelled"),
        Ok(Err(err)) => warn!(error = %err, "Failed to cancel upload session"),
        Err(_) => warn!("Timed out cancelling upload session"),
    }
}
