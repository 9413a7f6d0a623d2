//! `POST /v1/tasks/milestones/actions/{retry,mode}` (§4.11).

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate_indexer_logic::model::{MilestoneKind, StreamId};

use crate::{routes::error_response, server::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub contest_id: String,
    pub chain_id: u64,
    pub milestone: String,
    pub source_tx_hash: String,
    pub source_log_index: u32,
    pub actor: String,
    pub reason: Option<String>,
}

pub async fn retry(state: web::Data<AppState>, body: web::Json<RetryRequest>) -> HttpResponse {
    let body = body.into_inner();
    let milestone = match MilestoneKind::from_str(&body.milestone) {
        Ok(m) => m,
        Err(err) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": {"kind": "InputInvalid", "message": err.to_string()}
            }));
        }
    };
    let stream = StreamId::new(body.contest_id, body.chain_id);

    match state
        .control_plane
        .retry(
            stream,
            milestone,
            &body.source_tx_hash,
            body.source_log_index,
            &body.actor,
            body.reason.as_deref(),
        )
        .await
    {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetModeRequest {
    pub contest_id: String,
    pub chain_id: u64,
    pub mode: String,
    pub actor: String,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetModeResponse {
    mode: String,
}

pub async fn set_mode(state: web::Data<AppState>, body: web::Json<SetModeRequest>) -> HttpResponse {
    let body = body.into_inner();
    let stream = StreamId::new(body.contest_id, body.chain_id);

    let result = match body.mode.as_str() {
        "paused" => {
            state
                .control_plane
                .pause(stream, &body.actor, body.reason.as_deref())
                .await
        }
        "live" => {
            state
                .control_plane
                .resume(stream, &body.actor, body.reason.as_deref())
                .await
        }
        other => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": {"kind": "InputInvalid", "message": format!("unknown mode: {other}")}
            }));
        }
    };

    match result {
        Ok(()) => HttpResponse::Ok().json(SetModeResponse { mode: body.mode }),
        Err(err) => error_response(err),
    }
}
