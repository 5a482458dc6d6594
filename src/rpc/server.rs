//! HTTP server
//!
//! Axum router over the node API. The server binds loopback, and a guard
//! layer additionally rejects any non-loopback caller with 401. The
//! `/listen` route streams newline-delimited JSON events straight off the
//! node's broadcast bus.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Json, Router};
use futures::StreamExt;
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::cors::{Any, CorsLayer};

use crate::node::Node;
use crate::rpc::handlers;

/// Build the node's HTTP router.
pub fn router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(handlers::status))
        .route("/assets", get(handlers::assets))
        .route("/balances/:address", get(handlers::balances))
        .route("/balance/:address/:asset", get(handlers::balance))
        .route(
            "/unconfirmedBalances/:address",
            get(handlers::unconfirmed_balances),
        )
        .route(
            "/unconfirmedBalance/:address/:asset",
            get(handlers::unconfirmed_balance),
        )
        .route("/minter/:asset", get(handlers::minter))
        .route("/unconfirmedMinter/:asset", get(handlers::unconfirmed_minter))
        .route("/price/:asset", get(handlers::price))
        .route("/unconfirmedPrice/:asset", get(handlers::unconfirmed_price))
        .route("/submitMessage", post(handlers::submit_message))
        .route("/mine", post(handlers::mine))
        .route("/minedBlocks", get(handlers::mined_blocks))
        .route("/blocks/:height", get(handlers::block))
        .route("/blockcache", get(handlers::block_cache))
        .route("/mempool", get(handlers::mempool))
        .route("/peers", get(handlers::peers))
        .route("/peer", post(handlers::add_peer))
        .route("/listen", get(listen))
        .layer(middleware::from_fn(loopback_guard))
        .layer(cors)
        .with_state(node)
}

/// Requests from beyond the loopback interface are refused.
async fn loopback_guard(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !addr.ip().is_loopback() {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "loopback only" })),
        )
            .into_response();
    }
    next.run(request).await
}

/// Stream every accepted block, message and peer as one JSON object per
/// line. A subscriber that lags simply misses the dropped events.
async fn listen(State(node): State<Arc<Node>>) -> Response {
    let events = BroadcastStream::new(node.events().subscribe())
        .filter_map(|event| async move { event.ok() })
        .map(|event| {
            let line = serde_json::to_string(&event).unwrap_or_default();
            Ok::<_, Infallible>(format!("{line}\n"))
        });
    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(events))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
