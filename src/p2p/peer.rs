//! Per-peer replication tasks
//!
//! Each enabled peer owns two tasks: a streaming subscription to the
//! peer's `/listen` feed, re-opened one second after any failure, and a
//! thirty-second pull cycle that fetches recent blocks, the mempool, and
//! the peer list. Everything lands in the node's ingestion API, where
//! soft errors evaporate.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tracing::debug;

use crate::chain::Mempool;
use crate::consensus::Block;
use crate::constants::{CHARGE_SETTLE_BLOCKS, PEER_PULL_INTERVAL, PEER_RETRY_DELAY};
use crate::events::NodeEvent;
use crate::node::Node;

const PULL_TIMEOUT: Duration = Duration::from_secs(10);

/// Follow a peer's `/listen` stream for as long as the peer is enabled.
pub async fn run_listen(node: Arc<Node>, url: String) {
    let client = Client::new();
    loop {
        if !node.peer_enabled(&url) {
            return;
        }
        if let Err(err) = subscribe_once(&node, &client, &url).await {
            debug!(url, %err, "listen stream closed");
        }
        tokio::time::sleep(Duration::from_millis(PEER_RETRY_DELAY)).await;
    }
}

/// One subscription attempt: open the stream and ingest newline-framed
/// events until it ends.
async fn subscribe_once(node: &Arc<Node>, client: &Client, url: &str) -> reqwest::Result<()> {
    let response = client
        .get(format!("{url}/listen"))
        .send()
        .await?
        .error_for_status()?;
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
        while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            if let Ok(event) = serde_json::from_slice::<NodeEvent>(&line) {
                node.ingest_event(event);
            }
        }
        if !node.peer_enabled(url) {
            return Ok(());
        }
    }
    Ok(())
}

/// Periodic pull cycle against one peer.
pub async fn run_pull(node: Arc<Node>, url: String) {
    let client = Client::builder()
        .timeout(PULL_TIMEOUT)
        .build()
        .expect("reqwest client");
    loop {
        tokio::time::sleep(Duration::from_millis(PEER_PULL_INTERVAL)).await;
        if !node.peer_enabled(&url) {
            return;
        }
        tokio::join!(
            pull_blocks(&node, &client, &url),
            pull_mempool(&node, &client, &url),
            pull_peers(&node, &client, &url),
        );
    }
}

/// Walk the peer's blocks upward from just below our settle window until
/// the first 404.
async fn pull_blocks(node: &Arc<Node>, client: &Client, url: &str) {
    let mut height = node.tail_height().saturating_sub(CHARGE_SETTLE_BLOCKS).max(1);
    loop {
        let response = match client.get(format!("{url}/blocks/{height}")).send().await {
            Ok(response) => response,
            Err(_) => return,
        };
        if response.status().as_u16() == 404 || !response.status().is_success() {
            return;
        }
        match response.json::<Block>().await {
            Ok(block) => node.ingest_remote_block(block),
            Err(_) => return,
        }
        height += 1;
    }
}

async fn pull_mempool(node: &Arc<Node>, client: &Client, url: &str) {
    let Ok(response) = client.get(format!("{url}/mempool")).send().await else {
        return;
    };
    let Ok(mempool) = response.json::<Mempool>().await else {
        return;
    };
    for block in mempool.blocks {
        node.ingest_remote_block(block);
    }
    for message in mempool.messages {
        node.ingest_remote_message(message);
    }
}

async fn pull_peers(node: &Arc<Node>, client: &Client, url: &str) {
    let Ok(response) = client.get(format!("{url}/peers")).send().await else {
        return;
    };
    let Ok(peers) = response.json::<Vec<String>>().await else {
        return;
    };
    for peer in peers {
        node.add_peer(&peer);
    }
}
