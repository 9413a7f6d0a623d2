//! `POST /v1/indexer/replays` (§4.11).

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};

use crate_indexer_logic::model::{StreamId, stringified_u64};

use crate::{routes::error_response, server::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleReplayRequest {
    pub contest_id: String,
    pub chain_id: u64,
    #[serde(with = "stringified_u64")]
    pub from_block: u64,
    #[serde(with = "stringified_u64")]
    pub to_block: u64,
    pub reason: String,
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_actor() -> String {
    "unknown".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleReplayResponse {
    job_id: i64,
    scheduled_range: ScheduledRange,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduledRange {
    #[serde(with = "stringified_u64")]
    from_block: u64,
    #[serde(with = "stringified_u64")]
    to_block: u64,
}

pub async fn schedule_replay(
    state: web::Data<AppState>,
    body: web::Json<ScheduleReplayRequest>,
) -> HttpResponse {
    let body = body.into_inner();
    let stream = StreamId::new(body.contest_id, body.chain_id);

    match state
        .control_plane
        .replay(stream, body.from_block, body.to_block, &body.reason, &body.actor)
        .await
    {
        Ok(job_id) => HttpResponse::Accepted().json(ScheduleReplayResponse {
            job_id,
            scheduled_range: ScheduledRange {
                from_block: body.from_block,
                to_block: body.to_block,
            },
        }),
        Err(err) => error_response(err),
    }
}
