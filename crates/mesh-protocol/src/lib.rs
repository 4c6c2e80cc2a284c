//! Device ↔ coordinator wire protocol: the "typed, length-prefixed binary
//! request/response" channel from spec §6, implemented as a serde-tagged
//! JSON envelope sent as `tokio-tungstenite` WebSocket text frames by the
//! transport layer in `mesh-coordinator`/`mesh-device-sdk`.
//!
//! Grounded on `sa_protocol::WsMessage`: a single tagged enum per direction,
//! one variant per RPC family, correlated by `request_id` the way the
//! teacher's `tool_request`/`tool_response` pair is.

use mesh_domain::device::{Capabilities, LocalModel, Throughput};
use mesh_domain::file::{ReadFileRequest, ReadFileResponse};
use mesh_domain::job::TaskKind;
use serde::{Deserialize, Serialize};

/// Device → Coordinator messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceMessage {
    /// Initial handshake, analogous to `node_hello`.
    #[serde(rename = "device_hello")]
    Hello {
        device_id: String,
        name: String,
        platform: String,
        arch: String,
        capabilities: Capabilities,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_model: Option<LocalModel>,
        #[serde(default)]
        throughput: Throughput,
        #[serde(default)]
        free_memory_mb: u64,
        version: String,
    },

    /// Result of a `RunTask` dispatch.
    #[serde(rename = "task_result")]
    TaskResult {
        request_id: String,
        ok: bool,
        output: String,
        error: String,
        time_ms: u64,
    },

    /// Result of a `RunLLMTask` dispatch.
    #[serde(rename = "llm_task_result")]
    LlmTaskResult {
        request_id: String,
        output: String,
        model_used: String,
        tokens_generated: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Result of a `ReadFile` forward.
    #[serde(rename = "read_file_result")]
    ReadFileResult {
        request_id: String,
        response: ReadFileResponse,
    },

    /// Result of a signaling passthrough (`StartWebRTC`/`CompleteWebRTC`/`StopWebRTC`).
    #[serde(rename = "webrtc_result")]
    WebRtcResult {
        request_id: String,
        payload: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Result of `CreateDownloadTicket`.
    #[serde(rename = "ticket_result")]
    TicketResult {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
        #[serde(default)]
        size_bytes: u64,
        #[serde(default)]
        expires_unix_ms: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Heartbeat response.
    #[serde(rename = "pong")]
    Pong { timestamp_ms: i64 },

    /// Result of a routed `execute_shell_cmd` dispatch.
    #[serde(rename = "exec_result")]
    ExecResult {
        request_id: String,
        output: String,
        error: String,
        time_ms: u64,
    },
}

/// Coordinator → Device messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CoordinatorMessage {
    /// Handshake accepted.
    #[serde(rename = "coordinator_welcome")]
    Welcome {
        session_id: String,
        coordinator_version: String,
    },

    /// Dispatch a non-LLM task (spec §4.7 `RunTask`).
    #[serde(rename = "run_task")]
    RunTask {
        request_id: String,
        task_id: String,
        job_id: String,
        kind: TaskKind,
        input: String,
    },

    /// Dispatch an `LLM_GENERATE` task (spec §4.7 `RunLLMTask`).
    #[serde(rename = "run_llm_task")]
    RunLlmTask {
        request_id: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_tokens: Option<u32>,
    },

    /// Forward a `ReadFile` call to the device.
    #[serde(rename = "read_file")]
    ReadFile {
        request_id: String,
        request: ReadFileRequest,
    },

    /// Forward a WebRTC signaling call verbatim; media never traverses the
    /// coordinator (spec §4.7).
    #[serde(rename = "start_webrtc")]
    StartWebRtc {
        request_id: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "complete_webrtc")]
    CompleteWebRtc {
        request_id: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "stop_webrtc")]
    StopWebRtc {
        request_id: String,
        payload: serde_json::Value,
    },

    /// Ask the device to issue a bulk-download ticket for `path`.
    #[serde(rename = "create_download_ticket")]
    CreateDownloadTicket { request_id: String, path: String },

    /// Heartbeat.
    #[serde(rename = "ping")]
    Ping { timestamp_ms: i64 },

    /// Routed `execute_shell_cmd` dispatch (spec §4.9), distinct from
    /// `RunTask`: the tool executor's shell exec carries a working
    /// directory and denylist checks that don't apply to `TaskKind`.
    #[serde(rename = "exec_cmd")]
    ExecCmd {
        request_id: String,
        command: String,
        timeout_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        working_dir: Option<String>,
    },
}

/// Maximum payload size for a single framed message (4 MB), matching the
/// teacher's `MAX_TOOL_RESPONSE_BYTES` cap on device-produced results.
pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Current wire-protocol version, bumped on any breaking envelope change.
pub const PROTOCOL_VERSION: &str = "1";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_hello_round_trips_through_json() {
        let msg = DeviceMessage::Hello {
            device_id: "d1".into(),
            name: "laptop".into(),
            platform: "linux".into(),
            arch: "x86_64".into(),
            capabilities: Capabilities {
                has_cpu: true,
                has_gpu: false,
                has_npu: false,
                can_screen_capture: false,
                has_local_model: false,
            },
            local_model: None,
            throughput: Throughput::default(),
            free_memory_mb: 2048,
            version: "0.1.0".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"device_hello\""));
        let back: DeviceMessage = serde_json::from_str(&json).unwrap();
        match back {
            DeviceMessage::Hello { device_id, .. } => assert_eq!(device_id, "d1"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn run_task_tags_kind_as_screaming_snake_case() {
        let msg = CoordinatorMessage::RunTask {
            request_id: "r1".into(),
            task_id: "t1".into(),
            job_id: "j1".into(),
            kind: TaskKind::Sysinfo,
            input: String::new(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["kind"], "SYSINFO");
    }
}
