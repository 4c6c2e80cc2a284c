//! The JSON gateway router (spec §6: "a thin façade" over the RPC surface),
//! built the way `gateway/src/api/mod.rs` builds its router: a public
//! (unauthenticated) half merged with a protected half gated by
//! `middleware::from_fn_with_state`.

pub mod chat;
pub mod devices;
pub mod files;
pub mod jobs;
pub mod planning;
pub mod routing;
pub mod sessions;
pub mod webrtc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::auth;
use crate::state::AppState;

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/v1/health", get(health))
        .route("/v1/devices/ws", get(crate::ws::device_ws))
        .route("/v1/sessions", post(sessions::create_session));

    let protected = Router::new()
        .route("/v1/sessions/:session_id/heartbeat", post(sessions::heartbeat))
        .route("/v1/devices", get(devices::list_devices))
        .route("/v1/devices/:id/status", get(devices::get_device_status))
        .route("/v1/exec", post(routing::execute_routed_command))
        .route("/v1/jobs", post(jobs::submit_job))
        .route("/v1/jobs/:job_id", get(jobs::get_job))
        .route("/v1/plan/preview", post(planning::preview_plan))
        .route("/v1/plan/cost", post(planning::preview_plan_cost))
        .route("/v1/files/read", post(files::read_file))
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/memory", post(chat::sync_chat_memory))
        .route("/v1/webrtc/start", post(webrtc::start_webrtc))
        .route("/v1/webrtc/complete", post(webrtc::complete_webrtc))
        .route("/v1/webrtc/stop", post(webrtc::stop_webrtc))
        .route("/v1/files/ticket", post(webrtc::create_download_ticket))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    public
        .merge(protected)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
