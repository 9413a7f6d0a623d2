//! `GET /healthz` and `GET /v1/tasks/status` (§4.12).
//!
//! The two routes share a snapshot but not a shape: `/healthz` is the
//! liveness probe and answers with the minimal `{status, reasons,
//! timestamp}` body a load balancer or orchestrator expects, while
//! `/v1/tasks/status` is the operator-facing diagnostic and returns the
//! full [`crate_indexer_logic::health::HealthSnapshot`].

use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate_indexer_logic::health;

use crate::{routes::error_response, server::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LivenessResponse {
    status: &'static str,
    reasons: Vec<String>,
    timestamp: DateTime<Utc>,
}

pub async fn healthz(state: web::Data<AppState>) -> HttpResponse {
    match health::snapshot(state.db.as_ref(), &crate::server::QUEUE_NAMES).await {
        Ok(snapshot) => {
            let status = if snapshot.mode == "healthy" {
                actix_web::http::StatusCode::OK
            } else {
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE
            };
            HttpResponse::build(status).json(LivenessResponse {
                status: snapshot.mode,
                reasons: snapshot.active_alerts,
                timestamp: snapshot.timestamp,
            })
        }
        Err(err) => error_response(err),
    }
}

pub async fn task_status(state: web::Data<AppState>) -> HttpResponse {
    match health::snapshot(state.db.as_ref(), &crate::server::QUEUE_NAMES).await {
        Ok(snapshot) => {
            let status = if snapshot.mode == "healthy" {
                actix_web::http::StatusCode::OK
            } else {
                actix_web::http::StatusCode::SERVICE_UNAVAILABLE
            };
            HttpResponse::build(status).json(snapshot)
        }
        Err(err) => error_response(err),
    }
}
