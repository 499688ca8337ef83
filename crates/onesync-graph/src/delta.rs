//! Microsoft Graph Delta API for incremental synchronization
//!
//! ## Delta Query Flow
//!
//! 1. **Initial sync**: call [`fetch_all`] with an empty token to enumerate the drive
//! 2. **Follow pages**: `@odata.nextLink` pages are followed up to the
//!    client's page ceiling
//! 3. **Save token**: the returned [`DeltaSync::next_token`] is the
//!    `@odata.deltaLink` of the terminal page
//! 4. **Incremental sync**: call [`fetch_all`] with the saved token
//!
//! A token is an absolute URL and must point at the client's base URL; any
//! other URL is rejected before a request is made. HTTP 410 on any page means
//! the token expired and surfaces as [`GraphError::DeltaTokenExpired`]; the
//! caller restarts from an empty token.
//!
//! Every page is run through [`normalize`](crate::normalize::normalize)
//! before it is returned.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use onesync_core::domain::DriveId;
//! use onesync_core::ports::StaticToken;
//! use onesync_graph::{client::GraphClient, delta};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), onesync_graph::GraphError> {
//! let client = GraphClient::new(Arc::new(StaticToken::new("access-token")));
//! let cancel = CancellationToken::new();
//! let drive = DriveId::new("b!abc");
//!
//! let sync = delta::fetch_all(&client, &drive, "", &cancel).await?;
//! println!("Got {} items, next token {}", sync.items.len(), sync.next_token);
//! # Ok(())
//! # }
//! ```

use onesync_core::domain::{DeltaContinuation, DeltaPage, DeltaSync, DriveId, Item};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{encode_segment, GraphClient};
use crate::drive_item::GraphDriveItem;
use crate::error::{ErrorKind, GraphError, Result};
use crate::normalize::normalize;

/// Asks the service to report shared items under their alias id
pub const DELTA_PREFER: &str = "deltashowremoteitemsaliasid";

/// Raw response from the Microsoft Graph delta API
///
/// See: <https://learn.microsoft.com/en-us/graph/api/driveitem-delta>
#[derive(Debug, Deserialize)]
struct GraphDeltaResponse {
    #[serde(default)]
    value: Vec<GraphDriveItem>,

    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,

    #[serde(rename = "@odata.deltaLink")]
    delta_link: Option<String>,
}

/// Path of the initial delta request for `drive_id`
pub fn delta_path(drive_id: &DriveId) -> String {
    format!("/drives/{}/root/delta", encode_segment(drive_id.as_str()))
}

/// Resolves `token` into a request path relative to the client's base URL
fn request_path(client: &GraphClient, drive_id: &DriveId, token: &str) -> Result<String> {
    if token.is_empty() {
        if drive_id.is_empty() {
            return Err(GraphError::Validation(
                "drive id is required for an initial delta query".to_string(),
            ));
        }
        return Ok(delta_path(drive_id));
    }
    client.path_from_link(token).ok_or_else(|| {
        GraphError::Validation(format!(
            "delta token does not point at the configured API base {}",
            client.base_url()
        ))
    })
}

/// Fetches and normalizes a single page of the change feed.
///
/// An empty `token` starts a new enumeration of `drive_id`; otherwise `token`
/// is a next link or delta link returned earlier.
///
/// # Errors
/// [`GraphError::Validation`] for an off-host token (no request is made),
/// [`GraphError::DeltaTokenExpired`] on HTTP 410, and the transport errors of
/// [`GraphClient::execute`].
pub async fn fetch_page(
    client: &GraphClient,
    drive_id: &DriveId,
    token: &str,
    cancel: &CancellationToken,
) -> Result<DeltaPage> {
    let path = request_path(client, drive_id, token)?;

    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static(DELTA_PREFER));

    let response = match client
        .execute(Method::GET, &path, None, &headers, cancel)
        .await
    {
        Ok(response) => response,
        Err(GraphError::Api(error)) if error.kind == Some(ErrorKind::Gone) => {
            warn!(drive = %drive_id, "Delta token expired, full resync required");
            return Err(GraphError::DeltaTokenExpired(error));
        }
        Err(other) => return Err(other),
    };

    let raw: GraphDeltaResponse = crate::client::decode_json(response).await?;
    let both_links = matches!(
        (&raw.next_link, &raw.delta_link),
        (Some(next), Some(delta)) if !next.is_empty() && !delta.is_empty()
    );
    if both_links {
        warn!(drive = %drive_id, "Delta page carries both nextLink and deltaLink, following nextLink");
    }

    let received = raw.value.len();
    let items = normalize(raw.value.into_iter().map(Item::from).collect());
    let continuation = DeltaContinuation::from_links(raw.next_link, raw.delta_link);

    debug!(
        drive = %drive_id,
        received,
        items = items.len(),
        has_next = continuation.next_link().is_some(),
        "Received delta page"
    );

    Ok(DeltaPage {
        items,
        continuation,
    })
}

/// Follows the change feed from `token` until a terminal page.
///
/// Pages are requested in order; their normalized items are concatenated.
/// The feed ends at a page with a delta link (its URL becomes
/// [`DeltaSync::next_token`]) or at a page with neither link (logged, empty
/// token). At most [`GraphClient::max_delta_pages`] requests are made.
///
/// # Errors
/// [`GraphError::PaginationExceeded`] when the ceiling is reached while the
/// feed still has a next link, plus every error of [`fetch_page`]. Items from
/// earlier pages are discarded on error.
pub async fn fetch_all(
    client: &GraphClient,
    drive_id: &DriveId,
    token: &str,
    cancel: &CancellationToken,
) -> Result<DeltaSync> {
    let max_pages = client.max_delta_pages();
    let mut items = Vec::new();
    let mut current = token.to_string();

    debug!(drive = %drive_id, has_token = !token.is_empty(), "Starting delta query");

    for page_number in 1..=max_pages {
        let page = fetch_page(client, drive_id, &current, cancel).await?;
        items.extend(page.items);

        match page.continuation {
            DeltaContinuation::Next(next) => {
                debug!(page = page_number, "Following delta nextLink");
                current = next;
            }
            DeltaContinuation::Delta(delta) => {
                info!(
                    drive = %drive_id,
                    pages = page_number,
                    items = items.len(),
                    "Delta query complete"
                );
                return Ok(DeltaSync {
                    items,
                    next_token: delta,
                });
            }
            DeltaContinuation::Missing => {
                warn!(
                    drive = %drive_id,
                    pages = page_number,
                    "Delta query ended without a deltaLink; next sync will be a full enumeration"
                );
                return Ok(DeltaSync {
                    items,
                    next_token: String::new(),
                });
            }
        }
    }

    warn!(drive = %drive_id, max_pages, "Delta pagination ceiling reached");
    Err(GraphError::PaginationExceeded { max_pages })
}
