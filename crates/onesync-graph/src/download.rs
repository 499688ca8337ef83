//! File content download
//!
//! Items returned by the drive endpoints carry a short-lived,
//! pre-authenticated `@microsoft.graph.downloadUrl`. Content is fetched from
//! that URL through the pre-authenticated transport, so no bearer token is
//! sent to the download host.

use std::future::ready;

use bytes::Bytes;
use futures_util::StreamExt;
use onesync_core::domain::Item;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::GraphClient;
use crate::error::{GraphError, Result};

fn download_url(item: &Item) -> Result<&str> {
    if item.is_folder {
        return Err(GraphError::Validation(format!(
            "item {} is a folder and has no content",
            item.id
        )));
    }
    item.download_url
        .as_deref()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| GraphError::Validation(format!("item {} has no download URL", item.id)))
}

/// Downloads the whole content of `item` into memory
pub async fn download(
    client: &GraphClient,
    item: &Item,
    cancel: &CancellationToken,
) -> Result<Bytes> {
    let url = download_url(item)?;
    debug!(id = %item.id, size = item.size, "Downloading item content");

    let response = client
        .execute_preauth("download content", |http| ready(Ok(http.get(url))), cancel)
        .await?;

    let bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(GraphError::Cancelled),
        body = response.bytes() => body.map_err(GraphError::Body)?,
    };

    debug!(id = %item.id, bytes = bytes.len(), "Downloaded item content");
    Ok(bytes)
}

/// Streams the content of `item` into `writer`, returning the number of
/// bytes written. The writer is flushed on success.
pub async fn download_to<W>(
    client: &GraphClient,
    item: &Item,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let url = download_url(item)?;
    debug!(id = %item.id, size = item.size, "Streaming item content");

    let response = client
        .execute_preauth("download content", |http| ready(Ok(http.get(url))), cancel)
        .await?;

    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GraphError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(GraphError::Body)?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;

    debug!(id = %item.id, bytes = written, "Streamed item content");
    Ok(written)
}
