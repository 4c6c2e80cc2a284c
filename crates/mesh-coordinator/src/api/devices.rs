//! `ListDevices`/`GetDeviceStatus` (spec §4.1/§4.7). Device registration
//! itself has no REST counterpart — it happens implicitly on the device
//! WebSocket's `device_hello` handshake (see `ws.rs`).

use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use mesh_domain::device::{Device, DeviceStatus};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<Device>> {
    Json(state.registry.list())
}

pub async fn get_device_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeviceStatus>> {
    let deadline = Duration::from_secs(state.config.server.default_deadline_secs);
    let status = state.registry.probe(&id, deadline).await?;
    Ok(Json(status))
}
