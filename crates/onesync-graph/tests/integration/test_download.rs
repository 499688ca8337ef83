//! Integration tests for content download through pre-authenticated URLs

use onesync_core::domain::Item;
use onesync_graph::{download, ErrorKind, GraphError};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

const CONTENT_PATH: &str = "/download/file-a";

fn file_item(server: &MockServer) -> Item {
    Item {
        id: "file-a".to_string(),
        name: "a.txt".to_string(),
        size: 11,
        download_url: Some(format!("{}{}", server.uri(), CONTENT_PATH)),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_download_returns_content_without_authorization() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(CONTENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let bytes = download::download(&client, &file_item(&server), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"hello world");

    let requests = common::requests(&server).await;
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_download_to_writer() {
    let (server, client) = common::setup_graph_mock().await;
    let body: Vec<u8> = (0..200_000u32).map(|i| (i % 97) as u8).collect();

    Mock::given(method("GET"))
        .and(path(CONTENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let mut sink: Vec<u8> = Vec::new();
    let written = download::download_to(
        &client,
        &file_item(&server),
        &mut sink,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(written, body.len() as u64);
    assert_eq!(sink, body);
}

#[tokio::test]
async fn test_download_not_found_is_not_retried() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(CONTENT_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = download::download(&client, &file_item(&server), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotFound));
    assert_eq!(common::requests(&server).await.len(), 1);
}

#[tokio::test]
async fn test_download_retries_transient_failure() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path(CONTENT_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(CONTENT_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
        .mount(&server)
        .await;

    let bytes = download::download(&client, &file_item(&server), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(bytes.len(), 11);
    assert_eq!(common::requests(&server).await.len(), 2);
}

#[tokio::test]
async fn test_folder_or_missing_url_rejected_without_request() {
    let (server, client) = common::setup_graph_mock().await;
    let cancel = CancellationToken::new();

    let folder = Item {
        is_folder: true,
        ..file_item(&server)
    };
    let err = download::download(&client, &folder, &cancel).await.unwrap_err();
    assert!(matches!(err, GraphError::Validation(_)));

    let no_url = Item {
        download_url: None,
        ..file_item(&server)
    };
    let err = download::download(&client, &no_url, &cancel).await.unwrap_err();
    assert!(matches!(err, GraphError::Validation(_)));

    assert!(common::requests(&server).await.is_empty());
}
