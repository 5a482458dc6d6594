//! CRD ledger node
//!
//! Main entry point: configuration from the environment, chain recovery,
//! the loopback HTTP surface, and graceful shutdown on ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crd_core::config::NodeConfig;
use crd_core::node::Node;
use crd_core::rpc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = NodeConfig::from_env();
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        self_url = %config.self_url,
        "starting crd-node"
    );

    let node = Node::start(config.clone())?;
    let app = rpc::router(node.clone());

    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(node))
    .await?;

    Ok(())
}

/// Wait for ctrl-c, then tear the node down in order: miner, peers,
/// pending saves. The server closes once this future resolves.
async fn shutdown_signal(node: Arc<Node>) {
    let _ = tokio::signal::ctrl_c().await;
    node.shutdown().await;
}
