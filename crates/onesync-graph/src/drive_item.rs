//! Microsoft Graph `driveItem` wire types
//!
//! The structs mirror the JSON returned by the drive endpoints and are
//! converted into [`Item`] by a single pure function. Timestamps are kept as
//! strings on the wire and parsed leniently, so one malformed date does not
//! reject a whole delta page.
//!
//! See: <https://learn.microsoft.com/en-us/graph/api/resources/driveitem>

use chrono::{DateTime, Utc};
use onesync_core::domain::{DriveId, Item};
use serde::Deserialize;

/// A drive item as returned by the Graph API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphDriveItem {
    #[serde(default)]
    pub id: String,

    /// Name of the item (may be percent-encoded in delta responses)
    #[serde(default)]
    pub name: String,

    pub size: Option<u64>,
    pub e_tag: Option<String>,
    pub c_tag: Option<String>,
    pub created_date_time: Option<String>,
    pub last_modified_date_time: Option<String>,
    pub parent_reference: Option<GraphParentReference>,
    pub file: Option<GraphFileFacet>,
    pub folder: Option<GraphFolderFacet>,

    /// Presence marks an item that must not be treated as a plain file or folder
    pub package: Option<serde_json::Value>,

    /// Presence marks a deletion
    pub deleted: Option<serde_json::Value>,

    /// Client-visible timestamps, preferred over the service ones
    pub file_system_info: Option<GraphFileSystemInfo>,
    pub remote_item: Option<GraphRemoteItem>,

    #[serde(rename = "@microsoft.graph.downloadUrl")]
    pub download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphParentReference {
    pub id: Option<String>,
    pub drive_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphFileFacet {
    pub hashes: Option<GraphHashes>,
}

/// Content hashes; which ones are present depends on the drive type
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphHashes {
    pub quick_xor_hash: Option<String>,
    pub sha1_hash: Option<String>,
    pub sha256_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphFolderFacet {
    pub child_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphFileSystemInfo {
    pub created_date_time: Option<String>,
    pub last_modified_date_time: Option<String>,
}

/// Facet present on items that alias an item in another drive
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GraphRemoteItem {
    pub id: Option<String>,
    pub parent_reference: Option<GraphParentReference>,
    pub folder: Option<GraphFolderFacet>,
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<GraphDriveItem> for Item {
    fn from(raw: GraphDriveItem) -> Self {
        let parent = raw.parent_reference.as_ref();
        let parent_drive_id = parent
            .and_then(|p| p.drive_id.as_deref())
            .map(DriveId::new)
            .unwrap_or_default();
        let hashes = raw.file.as_ref().and_then(|f| f.hashes.as_ref());
        let fs_info = raw.file_system_info.as_ref();
        let remote = raw.remote_item.as_ref();

        let created_at = parse_timestamp(fs_info.and_then(|f| f.created_date_time.as_deref()))
            .or_else(|| parse_timestamp(raw.created_date_time.as_deref()));
        let modified_at =
            parse_timestamp(fs_info.and_then(|f| f.last_modified_date_time.as_deref()))
                .or_else(|| parse_timestamp(raw.last_modified_date_time.as_deref()));

        let hash = |pick: fn(&GraphHashes) -> Option<&String>| -> String {
            hashes.and_then(pick).cloned().unwrap_or_default()
        };

        Item {
            quick_xor_hash: hash(|h| h.quick_xor_hash.as_ref()),
            sha1_hash: hash(|h| h.sha1_hash.as_ref()),
            sha256_hash: hash(|h| h.sha256_hash.as_ref()),
            drive_id: parent_drive_id.clone(),
            parent_id: parent.and_then(|p| p.id.clone()),
            parent_drive_id,
            is_folder: raw.folder.is_some() || remote.is_some_and(|r| r.folder.is_some()),
            is_deleted: raw.deleted.is_some(),
            is_package: raw.package.is_some(),
            size: raw.size.unwrap_or(0),
            etag: raw.e_tag.unwrap_or_default(),
            ctag: raw.c_tag.unwrap_or_default(),
            created_at,
            modified_at,
            child_count: raw.folder.as_ref().and_then(|f| f.child_count),
            remote_id: remote.and_then(|r| r.id.clone()),
            remote_drive_id: remote
                .and_then(|r| r.parent_reference.as_ref())
                .and_then(|p| p.drive_id.as_deref())
                .map(DriveId::new),
            download_url: raw.download_url,
            id: raw.id,
            name: raw.name,
        }
    }
}
