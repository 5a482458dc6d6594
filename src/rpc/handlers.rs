//! HTTP endpoint handlers
//!
//! Thin wrappers over the node API. Confirmed and unconfirmed query
//! pairs differ only in which snapshot they read. Validation errors map
//! to their tagged status with a JSON `error` body.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::chain::Mempool;
use crate::consensus::Block;
use crate::error::ChainError;
use crate::message::Message;
use crate::node::Node;
use crate::now_millis;

pub fn error_response(err: &ChainError) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

pub async fn status(State(node): State<Arc<Node>>) -> Json<serde_json::Value> {
    Json(json!({
        "startHeight": node.tail_height() + 1,
        "timestamp": now_millis(),
    }))
}

pub async fn assets(State(node): State<Arc<Node>>) -> Json<Vec<String>> {
    Json(node.snapshot().assets())
}

pub async fn balances(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Json<HashMap<String, u64>> {
    Json(node.snapshot().balances_of(&address))
}

pub async fn balance(
    State(node): State<Arc<Node>>,
    Path((address, asset)): Path<(String, String)>,
) -> Json<u64> {
    Json(node.snapshot().balance(&address, &asset))
}

pub async fn unconfirmed_balances(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Json<HashMap<String, u64>> {
    Json(node.unconfirmed_snapshot().balances_of(&address))
}

pub async fn unconfirmed_balance(
    State(node): State<Arc<Node>>,
    Path((address, asset)): Path<(String, String)>,
) -> Json<u64> {
    Json(node.unconfirmed_snapshot().balance(&address, &asset))
}

pub async fn minter(
    State(node): State<Arc<Node>>,
    Path(asset): Path<String>,
) -> Json<Option<String>> {
    Json(node.snapshot().minter(&asset).map(str::to_string))
}

pub async fn unconfirmed_minter(
    State(node): State<Arc<Node>>,
    Path(asset): Path<String>,
) -> Json<Option<String>> {
    Json(node.unconfirmed_snapshot().minter(&asset).map(str::to_string))
}

pub async fn price(
    State(node): State<Arc<Node>>,
    Path(asset): Path<String>,
) -> Json<Option<u64>> {
    Json(node.snapshot().price(&asset))
}

pub async fn unconfirmed_price(
    State(node): State<Arc<Node>>,
    Path(asset): Path<String>,
) -> Json<Option<u64>> {
    Json(node.unconfirmed_snapshot().price(&asset))
}

pub async fn submit_message(
    State(node): State<Arc<Node>>,
    Json(message): Json<Message>,
) -> Response {
    match node.submit_message(message) {
        Ok(()) => Json(json!({ "ok": true })).into_response(),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct MineRequest {
    pub address: Option<String>,
}

pub async fn mine(State(node): State<Arc<Node>>, Json(request): Json<MineRequest>) -> Response {
    match request.address {
        Some(address) => node.start_mining(address),
        None => node.stop_mining(),
    }
    Json(json!({ "ok": true })).into_response()
}

pub async fn mined_blocks(State(node): State<Arc<Node>>) -> Json<u64> {
    Json(node.mined_blocks())
}

pub async fn block(State(node): State<Arc<Node>>, Path(height): Path<u64>) -> Response {
    match node.block_at(height) {
        Some(block) => Json(block).into_response(),
        None => error_response(&ChainError::NotFound),
    }
}

pub async fn block_cache(State(node): State<Arc<Node>>) -> Json<Vec<Block>> {
    Json(node.block_cache())
}

pub async fn mempool(State(node): State<Arc<Node>>) -> Json<Mempool> {
    Json(node.mempool_snapshot())
}

pub async fn peers(State(node): State<Arc<Node>>) -> Json<Vec<String>> {
    Json(node.peer_urls())
}

#[derive(Debug, Deserialize)]
pub struct PeerRequest {
    pub url: String,
}

pub async fn add_peer(State(node): State<Arc<Node>>, Json(request): Json<PeerRequest>) -> Response {
    node.add_peer(&request.url);
    Json(json!({ "ok": true })).into_response()
}
