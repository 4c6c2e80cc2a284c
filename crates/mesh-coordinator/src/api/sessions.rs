//! `CreateSession`/`Heartbeat` (spec §4.3/§4.7).

use axum::extract::{Path, State};
use axum::Json;
use mesh_domain::session::Session;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub key: String,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> ApiResult<Json<Session>> {
    let session = state.sessions.create_session(&req.name, &req.key)?;
    Ok(Json(session))
}

pub async fn heartbeat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.sessions.heartbeat(&session_id)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
