//! `GET /v1/indexer/status` (§4.12, §4.3).
//!
//! Merges the registry's configured streams with their persisted
//! [`crate_indexer_logic::stream_state`] row and the RPC pool's live
//! endpoint snapshot, so a caller sees both "what's configured" and
//! "what happened on the last tick" in one response.

use actix_web::{HttpResponse, web};
use serde::Serialize;

use crate_indexer_logic::stream_state;

use crate::{routes::error_response, server::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StreamStatus {
    contest_id: String,
    chain_id: u64,
    contract_address: String,
    enabled: bool,
    state: Option<String>,
    active_rpc: Option<String>,
    error_streak: i32,
    lag_blocks: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexerStatusResponse {
    streams: Vec<StreamStatus>,
    rpc_endpoints: Vec<RpcEndpointStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RpcEndpointStatus {
    chain_id: u64,
    endpoint_id: String,
    priority: u32,
    enabled: bool,
    fail_count: u32,
    cooling: bool,
}

pub async fn indexer_status(state: web::Data<AppState>) -> HttpResponse {
    let persisted = match stream_state::list(state.db.as_ref()).await {
        Ok(rows) => rows,
        Err(err) => return error_response(err),
    };

    let streams = state
        .registry
        .list()
        .into_iter()
        .map(|config| {
            let row = persisted
                .iter()
                .find(|r| r.contest_id == config.contest_id && r.chain_id as u64 == config.chain_id);
            StreamStatus {
                contest_id: config.contest_id,
                chain_id: config.chain_id,
                contract_address: config.contract_address,
                enabled: config.enabled,
                state: row.map(|r| format!("{:?}", r.state)),
                active_rpc: row.and_then(|r| r.active_rpc.clone()),
                error_streak: row.map(|r| r.error_streak).unwrap_or(0),
                lag_blocks: row.map(|r| r.lag_blocks).unwrap_or(0),
            }
        })
        .collect();

    let rpc_endpoints = state
        .rpc_pool
        .snapshot()
        .into_iter()
        .map(|e| RpcEndpointStatus {
            chain_id: e.chain_id,
            endpoint_id: e.endpoint_id,
            priority: e.priority,
            enabled: e.enabled,
            fail_count: e.fail_count,
            cooling: e.cooling,
        })
        .collect();

    HttpResponse::Ok().json(IndexerStatusResponse { streams, rpc_endpoints })
}
