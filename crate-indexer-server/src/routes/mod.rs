//! HTTP surface (§6 External Interfaces).
//!
//! Handwritten `actix-web` handlers rather than generated proto glue: the
//! teacher's own services expose their HTTP surface through
//! `tonic-build`-generated `*_actix` modules, but this service carries no
//! gRPC/proto surface (§6 port note), so the routes below register directly
//! against [`actix_web::web::ServiceConfig`] the way
//! `blockscout_service_launcher::launcher::HttpRouter::register_routes`
//! expects.

mod health;
mod milestones;
mod replays;
mod status;

use actix_web::web;

use crate_indexer_logic::errors::CoreError;

pub fn configure(service_config: &mut web::ServiceConfig) {
    service_config
        .route("/healthz", web::get().to(health::healthz))
        .route("/v1/tasks/status", web::get().to(health::task_status))
        .route("/v1/indexer/status", web::get().to(status::indexer_status))
        .route("/v1/indexer/replays", web::post().to(replays::schedule_replay))
        .route(
            "/v1/tasks/milestones/actions/retry",
            web::post().to(milestones::retry),
        )
        .route(
            "/v1/tasks/milestones/actions/mode",
            web::post().to(milestones::set_mode),
        );
}

/// JSON error body shared by every route; status comes from
/// [`crate_indexer_logic::errors::ErrorKind::http_status`].
pub(crate) fn error_response(err: CoreError) -> actix_web::HttpResponse {
    let status = actix_web::http::StatusCode::from_u16(err.kind.http_status())
        .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
    actix_web::HttpResponse::build(status).json(serde_json::json!({
        "error": {
            "kind": format!("{:?}", err.kind),
            "message": err.message,
        }
    }))
}

pub(crate) type RouteResult = Result<actix_web::HttpResponse, actix_web::Error>;
