//! Integration tests for the delta change feed
//!
//! Covers pagination, normalization of every page, token validation, expiry
//! and the page ceiling against a wiremock Graph server.

use onesync_core::domain::DriveId;
use onesync_graph::delta::{self, DELTA_PREFER};
use onesync_graph::{ErrorKind, GraphError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, DRIVE_ID};

fn drive() -> DriveId {
    DriveId::new(DRIVE_ID)
}

#[tokio::test]
async fn test_initial_sync_single_page() {
    let (server, client) = common::setup_graph_mock().await;

    let mut package = common::file_json("pkg", "Notebook", "root", 10);
    package["package"] = json!({ "type": "oneNote" });

    common::mount_delta_single_page(
        &server,
        json!([
            common::file_json("a", "report%20final.txt", "root", 100),
            package,
            { "id": "dir", "name": "Docs", "folder": { "childCount": 0 },
              "parentReference": { "id": "root", "driveId": DRIVE_ID } }
        ]),
        "t1",
    )
    .await;

    let sync = delta::fetch_all(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = sync.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "dir"]);
    assert_eq!(sync.items[0].name, "report final.txt");
    assert!(sync.items[1].is_folder);
    assert_eq!(sync.next_token, common::delta_link(&server, "t1"));
}

#[tokio::test]
async fn test_requests_carry_prefer_header() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(common::delta_path()))
        .and(header("prefer", DELTA_PREFER))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@odata.deltaLink": common::delta_link(&server, "t1")
        })))
        .expect(1)
        .mount(&server)
        .await;

    delta::fetch_all(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_pagination_concatenates_pages() {
    let (server, client) = common::setup_graph_mock().await;

    common::mount_delta_paginated(
        &server,
        json!([
            common::file_json("a", "a.txt", "root", 1),
            common::file_json("b", "b.txt", "root", 2)
        ]),
        json!([common::file_json("c", "c.txt", "root", 3)]),
        "final",
    )
    .await;

    let sync = delta::fetch_all(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = sync.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert_eq!(sync.next_token, common::delta_link(&server, "final"));
    assert_eq!(common::requests(&server).await.len(), 2);
}

#[tokio::test]
async fn test_incremental_sync_uses_saved_token() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(common::delta_path()))
        .and(query_param("token", "saved"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [common::deleted_json("gone", "old.txt", "root")],
            "@odata.deltaLink": common::delta_link(&server, "newer")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = common::delta_link(&server, "saved");
    let sync = delta::fetch_all(&client, &drive(), &token, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(sync.items.len(), 1);
    assert!(sync.items[0].is_deleted);
    assert!(!sync.items[0].has_hashes());
    assert_eq!(sync.next_token, common::delta_link(&server, "newer"));
}

#[tokio::test]
async fn test_expired_token_is_distinct() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(common::delta_path()))
        .respond_with(ResponseTemplate::new(410).set_body_json(json!({
            "error": { "code": "resyncRequired", "message": "Resync required" }
        })))
        .mount(&server)
        .await;

    let token = common::delta_link(&server, "stale");
    let err = delta::fetch_all(&client, &drive(), &token, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, GraphError::DeltaTokenExpired(_)));
    assert!(err.is(ErrorKind::Gone));
    assert_eq!(common::requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_page_ceiling_is_enforced() {
    let (server, client) = common::setup_graph_mock().await;
    let client = client.with_max_delta_pages(3);

    Mock::given(method("GET"))
        .and(path(common::delta_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [],
            "@odata.nextLink": common::delta_link(&server, "loop")
        })))
        .mount(&server)
        .await;

    let err = delta::fetch_all(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, GraphError::PaginationExceeded { max_pages: 3 }));
    assert_eq!(common::requests(&server).await.len(), 3);
}

#[tokio::test]
async fn test_off_host_token_rejected_without_request() {
    let (server, client) = common::setup_graph_mock().await;

    let err = delta::fetch_all(
        &client,
        &drive(),
        "https://elsewhere.example.com/v1.0/drives/drive-001/root/delta?token=x",
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, GraphError::Validation(_)));
    assert!(common::requests(&server).await.is_empty());
}

#[tokio::test]
async fn test_page_without_links_ends_with_empty_token() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(common::delta_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [common::file_json("a", "a.txt", "root", 1)]
        })))
        .mount(&server)
        .await;

    let sync = delta::fetch_all(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sync.items.len(), 1);
    assert!(sync.next_token.is_empty());
}

#[tokio::test]
async fn test_next_link_wins_over_delta_link() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(common::delta_path()))
        .and(query_param_is_missing("token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [common::file_json("a", "a.txt", "root", 1)],
            "@odata.nextLink": common::delta_link(&server, "page2"),
            "@odata.deltaLink": common::delta_link(&server, "premature")
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(common::delta_path()))
        .and(query_param("token", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [common::file_json("b", "b.txt", "root", 2)],
            "@odata.deltaLink": common::delta_link(&server, "final")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sync = delta::fetch_all(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sync.items.len(), 2);
    assert_eq!(sync.next_token, common::delta_link(&server, "final"));
}

#[tokio::test]
async fn test_single_page_reports_continuation() {
    let (server, client) = common::setup_graph_mock().await;
    common::mount_delta_paginated(&server, json!([]), json!([]), "final").await;

    let page = delta::fetch_page(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        page.continuation.next_link(),
        Some(common::delta_link(&server, "page2").as_str())
    );
    assert!(page.continuation.delta_link().is_none());
}

#[tokio::test]
async fn test_deletions_precede_siblings_within_parent() {
    let (server, client) = common::setup_graph_mock().await;

    common::mount_delta_single_page(
        &server,
        json!([
            common::file_json("new", "report.txt", "p1", 5),
            common::file_json("other", "x.txt", "p2", 1),
            common::deleted_json("old", "report.txt", "p1"),
            common::file_json("dup", "first.txt", "p2", 1),
            common::file_json("dup", "second.txt", "p2", 2)
        ]),
        "t1",
    )
    .await;

    let sync = delta::fetch_all(&client, &drive(), "", &CancellationToken::new())
        .await
        .unwrap();

    let ids: Vec<&str> = sync.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["old", "other", "new", "dup"]);
    assert_eq!(sync.items[3].name, "second.txt");
}

#[tokio::test]
async fn test_cancelled_sync_makes_no_request() {
    let (server, client) = common::setup_graph_mock().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = delta::fetch_all(&client, &drive(), "", &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(common::requests(&server).await.is_empty());
}
