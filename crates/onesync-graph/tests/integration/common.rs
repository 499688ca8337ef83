//! Shared test helpers for Graph API integration tests
//!
//! Each helper mounts the mock endpoints a test needs. Clients built here use
//! a millisecond retry policy so retry counts can be asserted against a real
//! mock server without long sleeps.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use onesync_core::config::UploadConfig;
use onesync_core::ports::StaticToken;
use onesync_graph::{GraphClient, RetryPolicy};

pub const TEST_TOKEN: &str = "test-access-token";
pub const DRIVE_ID: &str = "drive-001";

/// Retry policy with millisecond delays
pub fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        base: Duration::from_millis(1),
        factor: 2,
        cap: Duration::from_millis(10),
    }
}

/// Starts a mock server and returns a client pointed at it.
pub async fn setup_graph_mock() -> (MockServer, GraphClient) {
    let server = MockServer::start().await;
    let client = client_for(&server);
    (server, client)
}

pub fn client_for(server: &MockServer) -> GraphClient {
    GraphClient::with_base_url(Arc::new(StaticToken::new(TEST_TOKEN)), server.uri())
        .with_retry_policy(fast_policy(5))
}

/// Upload limits small enough to exercise chunking with small bodies
pub fn small_upload_config() -> UploadConfig {
    UploadConfig {
        simple_upload_max_bytes: 320 * 1024,
        chunk_size_bytes: 320 * 1024,
    }
}

/// Requests the server has seen so far
pub async fn requests(server: &MockServer) -> Vec<Request> {
    server.received_requests().await.unwrap_or_default()
}

/// A minimal file driveItem
pub fn file_json(id: &str, name: &str, parent: &str, size: u64) -> Value {
    json!({
        "id": id,
        "name": name,
        "size": size,
        "eTag": format!("etag-{id}"),
        "lastModifiedDateTime": "2026-01-15T10:00:00Z",
        "parentReference": { "id": parent, "driveId": DRIVE_ID },
        "file": { "hashes": { "quickXorHash": "AAAAAAAAAAAAAAAAAAAAAAAAAAA=" } }
    })
}

/// A deleted driveItem
pub fn deleted_json(id: &str, name: &str, parent: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "parentReference": { "id": parent, "driveId": DRIVE_ID },
        "deleted": { "state": "deleted" },
        "file": { "hashes": { "quickXorHash": "stale" } }
    })
}

pub fn delta_path() -> String {
    format!("/drives/{DRIVE_ID}/root/delta")
}

/// Absolute delta link carrying `token`
pub fn delta_link(server: &MockServer, token: &str) -> String {
    format!("{}{}?token={}", server.uri(), delta_path(), token)
}

/// Mounts an initial delta request that returns a single terminal page.
pub async fn mount_delta_single_page(server: &MockServer, items: Value, delta_token: &str) {
    Mock::given(method("GET"))
        .and(path(delta_path()))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": items,
            "@odata.deltaLink": delta_link(server, delta_token)
        })))
        .mount(server)
        .await;
}

/// Mounts a two-page feed: the initial request returns a nextLink, the
/// nextLink returns the terminal page.
pub async fn mount_delta_paginated(
    server: &MockServer,
    page1_items: Value,
    page2_items: Value,
    delta_token: &str,
) {
    Mock::given(method("GET"))
        .and(path(delta_path()))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": page1_items,
            "@odata.nextLink": delta_link(server, "page2")
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(delta_path()))
        .and(query_param("token", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": page2_items,
            "@odata.deltaLink": delta_link(server, delta_token)
        })))
        .mount(server)
        .await;
}
