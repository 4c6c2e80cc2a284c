//! Signaling passthrough and bulk-download ticketing (spec §4.7): the
//! coordinator selects a device per policy and forwards the call verbatim,
//! the same `transport.forward` shape `routing.rs`/`files.rs` use for
//! `ExecCmd`/`ReadFile`. Media itself never traverses the coordinator, and
//! ticket redemption has no HTTP counterpart here — only issuance.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use mesh_domain::routing::RoutingPolicy;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

fn default_policy() -> RoutingPolicy {
    RoutingPolicy::BestAvailable
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct SignalingRequest {
    pub session_id: String,
    #[serde(default = "default_policy")]
    pub policy: RoutingPolicy,
    pub payload: serde_json::Value,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct SignalingResponse {
    pub selected_device_id: String,
    pub selected_device_name: String,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

pub async fn start_webrtc(
    State(state): State<AppState>,
    Json(req): Json<SignalingRequest>,
) -> ApiResult<Json<SignalingResponse>> {
    signal(state, req, |request_id, payload| mesh_protocol::CoordinatorMessage::StartWebRtc {
        request_id,
        payload,
    })
    .await
}

pub async fn complete_webrtc(
    State(state): State<AppState>,
    Json(req): Json<SignalingRequest>,
) -> ApiResult<Json<SignalingResponse>> {
    signal(state, req, |request_id, payload| mesh_protocol::CoordinatorMessage::CompleteWebRtc {
        request_id,
        payload,
    })
    .await
}

pub async fn stop_webrtc(
    State(state): State<AppState>,
    Json(req): Json<SignalingRequest>,
) -> ApiResult<Json<SignalingResponse>> {
    signal(state, req, |request_id, payload| mesh_protocol::CoordinatorMessage::StopWebRtc {
        request_id,
        payload,
    })
    .await
}

async fn signal(
    state: AppState,
    req: SignalingRequest,
    build: impl FnOnce(String, serde_json::Value) -> mesh_protocol::CoordinatorMessage,
) -> ApiResult<Json<SignalingResponse>> {
    state.sessions.resolve(&req.session_id)?;
    let selection = state.transport.resolve_device(&req.policy)?;

    let request_id = uuid::Uuid::new_v4().to_string();
    let msg = build(request_id.clone(), req.payload);
    let reply = state
        .transport
        .forward(
            &selection.device_id,
            request_id,
            msg,
            Duration::from_secs(req.timeout_secs),
        )
        .await?;

    Ok(Json(SignalingResponse {
        selected_device_id: selection.device_id,
        selected_device_name: selection.device_name,
        payload: reply.get("payload").cloned().unwrap_or(serde_json::Value::Null),
        error: reply
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateDownloadTicketRequest {
    pub session_id: String,
    #[serde(default = "default_policy")]
    pub policy: RoutingPolicy,
    pub path: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct CreateDownloadTicketResponse {
    pub selected_device_id: String,
    pub selected_device_name: String,
    pub token: Option<String>,
    pub filename: Option<String>,
    pub size_bytes: u64,
    pub expires_unix_ms: i64,
    pub error: Option<String>,
}

pub async fn create_download_ticket(
    State(state): State<AppState>,
    Json(req): Json<CreateDownloadTicketRequest>,
) -> ApiResult<Json<CreateDownloadTicketResponse>> {
    state.sessions.resolve(&req.session_id)?;
    let selection = state.transport.resolve_device(&req.policy)?;

    let request_id = uuid::Uuid::new_v4().to_string();
    let msg = mesh_protocol::CoordinatorMessage::CreateDownloadTicket {
        request_id: request_id.clone(),
        path: req.path,
    };
    let reply = state
        .transport
        .forward(
            &selection.device_id,
            request_id,
            msg,
            Duration::from_secs(req.timeout_secs),
        )
        .await?;

    Ok(Json(CreateDownloadTicketResponse {
        selected_device_id: selection.device_id,
        selected_device_name: selection.device_name,
        token: reply
            .get("token")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        filename: reply
            .get("filename")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        size_bytes: reply.get("size_bytes").and_then(serde_json::Value::as_u64).unwrap_or(0),
        expires_unix_ms: reply.get("expires_unix_ms").and_then(serde_json::Value::as_i64).unwrap_or(0),
        error: reply
            .get("error")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
    }))
}
