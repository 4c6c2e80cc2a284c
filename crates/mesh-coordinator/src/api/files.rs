//! `ReadFile` (spec §4.7/§4.9): local or device-forwarded byte-range reads.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use mesh_domain::file::{ReadFileRequest, ReadFileResponse, ReadMode};
use mesh_tools::RoutedBackend;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReadFileApiRequest {
    pub session_id: String,
    #[serde(default)]
    pub device_id: String,
    pub path: String,
    #[serde(default)]
    pub mode: ReadMode,
    #[serde(default = "mesh_domain::file::default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub length: Option<u64>,
}

pub async fn read_file(
    State(state): State<AppState>,
    Json(req): Json<ReadFileApiRequest>,
) -> ApiResult<Json<ReadFileResponse>> {
    state.sessions.resolve(&req.session_id)?;

    let deadline = Duration::from_secs(state.config.server.default_deadline_secs);
    let request = ReadFileRequest {
        device_id: req.device_id,
        path: req.path,
        mode: req.mode,
        max_bytes: req.max_bytes,
        offset: req.offset,
        length: req.length,
    };
    let response = state.routed_backend.read_file(request, deadline).await?;
    Ok(Json(response))
}
