//! The device WebSocket endpoint (spec §4.1/§4.7 device-side RPCs).
//!
//! Flow, adapted from `gateway/src/nodes/ws.rs`:
//! 1. Device connects to `/v1/devices/ws?token=<pre-shared-token>`.
//! 2. Device sends `device_hello` with its capabilities.
//! 3. Coordinator replies `coordinator_welcome` and registers the device.
//! 4. Bidirectional loop: coordinator forwards `run_task`/`exec_cmd`/etc.,
//!    device replies with the matching `*_result`, and the pending-request
//!    table wakes whichever caller is waiting on it.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use mesh_domain::device::{now_ms, Device, DeviceAddress};
use mesh_protocol::{CoordinatorMessage, DeviceMessage, PROTOCOL_VERSION};

use crate::state::AppState;

fn token_eq(a: &str, b: &str) -> bool {
    let ha = Sha256::digest(a.as_bytes());
    let hb = Sha256::digest(b.as_bytes());
    ha.ct_eq(&hb).into()
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /v1/devices/ws` — upgrade to a WebSocket, gated by the same shared
/// session key used for `CreateSession` (spec §4.3 has no separate
/// device-transport credential, so the configured shared key doubles as
/// the device connection token).
pub async fn device_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let provided = query.token.as_deref().unwrap_or("");
    if !token_eq(provided, &state.config.auth.shared_session_key) {
        return (axum::http::StatusCode::UNAUTHORIZED, "invalid or missing device token")
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let hello = match wait_for_hello(&mut ws_stream).await {
        Some(h) => h,
        None => {
            tracing::warn!("device disconnected before sending device_hello");
            return;
        }
    };

    let device_id = hello.device_id.clone();

    let welcome = CoordinatorMessage::Welcome {
        session_id: uuid::Uuid::new_v4().to_string(),
        coordinator_version: PROTOCOL_VERSION.to_string(),
    };
    if send_ws_message(&mut ws_sink, &welcome).await.is_err() {
        tracing::warn!(device_id = %device_id, "failed to send coordinator_welcome");
        return;
    }

    let device = Device {
        id: device_id.clone(),
        name: hello.name,
        platform: hello.platform,
        arch: hello.arch,
        address: DeviceAddress {
            primary: format!("ws-device:{device_id}"),
            secondary: None,
        },
        capabilities: hello.capabilities,
        local_model: hello.local_model,
        throughput: hello.throughput,
        free_memory_mb: hello.free_memory_mb,
        last_seen_ms: now_ms(),
    };
    if !device.is_well_formed() {
        tracing::warn!(device_id = %device_id, "rejecting malformed device_hello");
        return;
    }
    state.registry.upsert(device);
    tracing::info!(device_id = %device_id, "device connected");

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<CoordinatorMessage>(64);
    state.transport.register_sink(device_id.clone(), outbound_tx).await;

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if send_ws_message(&mut ws_sink, &msg).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<DeviceMessage>(&text) {
                Ok(parsed) => handle_inbound(&state, &device_id, parsed).await,
                Err(e) => tracing::debug!(device_id = %device_id, error = %e, "ignoring unparseable message"),
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => touch_last_seen(&state, &device_id),
            _ => {}
        }
    }

    state.transport.pending.fail_all_for_device(&device_id);
    state.transport.remove_sink(&device_id).await;
    writer.abort();
    state.registry.remove(&device_id);
    tracing::info!(device_id = %device_id, "device disconnected");
}

/// There is no dedicated `touch_last_seen` on `Registry` — bumping
/// `last_seen_ms` goes through a re-`upsert()` of the cached record, per
/// the registry crate's own doc comment deferring that responsibility here.
fn touch_last_seen(state: &AppState, device_id: &str) {
    if let Some(mut device) = state.registry.get(device_id) {
        device.last_seen_ms = now_ms();
        state.registry.upsert(device);
    }
}

struct HelloData {
    device_id: String,
    name: String,
    platform: String,
    arch: String,
    capabilities: mesh_domain::device::Capabilities,
    local_model: Option<mesh_domain::device::LocalModel>,
    throughput: mesh_domain::device::Throughput,
    free_memory_mb: u64,
}

async fn wait_for_hello(
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<HelloData> {
    let timeout = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                if let Ok(DeviceMessage::Hello {
                    device_id,
                    name,
                    platform,
                    arch,
                    capabilities,
                    local_model,
                    throughput,
                    free_memory_mb,
                    ..
                }) = serde_json::from_str::<DeviceMessage>(&text)
                {
                    return Some(HelloData {
                        device_id,
                        name,
                        platform,
                        arch,
                        capabilities,
                        local_model,
                        throughput,
                        free_memory_mb,
                    });
                }
            }
        }
        None
    })
    .await;
    timeout.unwrap_or(None)
}

async fn send_ws_message(
    sink: &mut (impl SinkExt<Message> + Unpin),
    msg: &CoordinatorMessage,
) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    sink.send(Message::Text(json)).await.map_err(|_| ())
}

async fn handle_inbound(state: &AppState, device_id: &str, msg: DeviceMessage) {
    touch_last_seen(state, device_id);

    match msg {
        DeviceMessage::TaskResult {
            request_id,
            ok,
            output,
            error,
            time_ms,
        } => {
            state.transport.pending.complete(
                &request_id,
                serde_json::json!({ "ok": ok, "output": output, "error": error, "time_ms": time_ms }),
            );
        }
        DeviceMessage::LlmTaskResult {
            request_id,
            output,
            model_used,
            tokens_generated,
            error,
        } => {
            state.transport.pending.complete(
                &request_id,
                serde_json::json!({
                    "output": output,
                    "model_used": model_used,
                    "tokens_generated": tokens_generated,
                    "error": error.unwrap_or_default(),
                }),
            );
        }
        DeviceMessage::ReadFileResult { request_id, response } => {
            match serde_json::to_value(response) {
                Ok(value) => state.transport.pending.complete(&request_id, value),
                Err(e) => tracing::warn!(request_id, error = %e, "failed to serialize read_file_result"),
            }
        }
        DeviceMessage::WebRtcResult { request_id, payload, error } => {
            state.transport.pending.complete(
                &request_id,
                serde_json::json!({ "payload": payload, "error": error }),
            );
        }
        DeviceMessage::TicketResult {
            request_id,
            token,
            filename,
            size_bytes,
            expires_unix_ms,
            error,
        } => {
            state.transport.pending.complete(
                &request_id,
                serde_json::json!({
                    "token": token,
                    "filename": filename,
                    "size_bytes": size_bytes,
                    "expires_unix_ms": expires_unix_ms,
                    "error": error,
                }),
            );
        }
        DeviceMessage::ExecResult {
            request_id,
            output,
            error,
            time_ms,
        } => {
            state.transport.pending.complete(
                &request_id,
                serde_json::json!({ "output": output, "error": error, "time_ms": time_ms }),
            );
        }
        DeviceMessage::Pong { .. } => {}
        DeviceMessage::Hello { .. } => {
            tracing::debug!(device_id, "ignoring duplicate device_hello on an established connection");
        }
    }
}
