//! The tool executor (C9): validates arguments against the fixed catalog,
//! rejects dangerous commands before dispatch, and bridges to whatever
//! backend `mesh-coordinator` wires up for C1/C2/C7.
//!
//! Grounded on `sa-tools::exec`'s validate-then-dispatch shape and
//! `sa-tools::file_ops`'s mode/range-read shape, narrowed to the three
//! tools spec §4.9 enumerates. The actual routed-execution/read-file RPCs
//! live behind [`RoutedBackend`] so this crate stays free of any transport
//! dependency — `mesh-coordinator` supplies the real implementation that
//! uses `mesh-registry::select` + the device WebSocket.

use std::sync::Arc;
use std::time::Duration;

use mesh_domain::file::{ReadFileRequest, ReadFileResponse, ReadMode};
use mesh_domain::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::denylist;

const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Projection of a registered device returned by `get_capabilities`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitySummary {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub arch: String,
    pub has_cpu: bool,
    pub has_gpu: bool,
    pub has_npu: bool,
    pub can_screen_capture: bool,
    pub has_local_model: bool,
    pub primary_endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_endpoint: Option<String>,
    pub ram_free_mb: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefill_tps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_tps: Option<f64>,
}

/// Result of a routed `execute_shell_cmd` dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedExecResult {
    pub output: String,
    pub error: String,
    pub time_ms: u64,
    pub selected_device_id: String,
    pub selected_device_name: String,
    pub executed_locally: bool,
}

/// The transport-owning half of the tool executor, implemented by
/// `mesh-coordinator` (it holds the registry and the device connections).
#[async_trait::async_trait]
pub trait RoutedBackend: Send + Sync {
    fn capability_snapshot(&self, include_benchmarks: bool) -> Vec<CapabilitySummary>;

    async fn execute_routed_command(
        &self,
        device_id: Option<&str>,
        command: &str,
        timeout: Duration,
        working_dir: Option<&str>,
    ) -> Result<RoutedExecResult>;

    async fn read_file(&self, request: ReadFileRequest, timeout: Duration) -> Result<ReadFileResponse>;
}

pub struct ToolExecutor<B: RoutedBackend> {
    backend: Arc<B>,
}

impl<B: RoutedBackend> ToolExecutor<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Dispatch a tool call. Always returns a JSON value: either the
    /// tool's result, or `{"error": "..."}` for an unknown tool or a
    /// validation failure — per spec §4.9, validation failures never reach
    /// the underlying RPC.
    pub async fn dispatch(&self, tool_name: &str, arguments: Value) -> Value {
        match tool_name {
            "get_capabilities" => self.get_capabilities(arguments),
            "execute_shell_cmd" => self.execute_shell_cmd(arguments).await,
            "get_file" => self.get_file(arguments).await,
            other => json!({ "error": format!("unknown tool: {other}") }),
        }
    }

    fn get_capabilities(&self, arguments: Value) -> Value {
        let include_benchmarks = arguments
            .get("include_benchmarks")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let devices = self.backend.capability_snapshot(include_benchmarks);
        json!({ "devices": devices })
    }

    async fn execute_shell_cmd(&self, arguments: Value) -> Value {
        let Some(command) = arguments.get("command").and_then(Value::as_str) else {
            return json!({ "error": "missing required parameter: command" });
        };
        if command.trim().is_empty() {
            return json!({ "error": "command must not be empty" });
        }
        if let Some(reason) = denylist::check(command) {
            tracing::warn!(command, reason, "execute_shell_cmd rejected by denylist");
            return json!({ "error": format!("command rejected by denylist: {reason}") });
        }
        let timeout_ms = match arguments.get("timeout_ms") {
            None => DEFAULT_TIMEOUT_MS,
            Some(v) => match v.as_u64() {
                Some(ms) if (MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&ms) => ms,
                Some(ms) => {
                    return json!({
                        "error": format!(
                            "timeout_ms {ms} out of range [{MIN_TIMEOUT_MS}, {MAX_TIMEOUT_MS}]"
                        )
                    })
                }
                None => return json!({ "error": "timeout_ms must be an integer" }),
            },
        };
        let device_id = arguments.get("device_id").and_then(Value::as_str);
        let working_dir = arguments.get("working_dir").and_then(Value::as_str);

        match self
            .backend
            .execute_routed_command(device_id, command, Duration::from_millis(timeout_ms), working_dir)
            .await
        {
            Ok(result) => serde_json::to_value(result).unwrap_or_else(|e| {
                json!({ "error": format!("failed to serialize result: {e}") })
            }),
            Err(e) => json!({ "error": e.message }),
        }
    }

    async fn get_file(&self, arguments: Value) -> Value {
        let Some(path) = arguments.get("path").and_then(Value::as_str) else {
            return json!({ "error": "missing required parameter: path" });
        };
        let mode = match arguments.get("read_mode").and_then(Value::as_str) {
            None => ReadMode::Full,
            Some("full") => ReadMode::Full,
            Some("head") => ReadMode::Head,
            Some("tail") => ReadMode::Tail,
            Some("range") => ReadMode::Range,
            Some(other) => return json!({ "error": format!("unknown read_mode: {other}") }),
        };
        let max_bytes = match arguments.get("max_bytes") {
            None => mesh_domain::file::default_max_bytes(),
            Some(v) => match v.as_u64() {
                Some(b) if b >= 1 && b <= mesh_domain::file::MAX_READ_BYTES => b,
                Some(b) => {
                    return json!({
                        "error": format!(
                            "max_bytes {b} exceeds the {} byte cap",
                            mesh_domain::file::MAX_READ_BYTES
                        )
                    })
                }
                None => return json!({ "error": "max_bytes must be an integer" }),
            },
        };
        let offset = arguments.get("offset").and_then(Value::as_u64);
        let length = arguments.get("length").and_then(Value::as_u64);
        if mode == ReadMode::Range && (offset.is_none() || length.is_none()) {
            return json!({ "error": "range mode requires both offset and length" });
        }
        let device_id = arguments
            .get("device_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let request = ReadFileRequest {
            device_id,
            path: path.to_string(),
            mode,
            max_bytes,
            offset,
            length,
        };
        match self
            .backend
            .read_file(request, Duration::from_secs(30))
            .await
        {
            Ok(response) => serde_json::to_value(response).unwrap_or_else(|e| {
                json!({ "error": format!("failed to serialize result: {e}") })
            }),
            Err(e) => json!({ "error": e.message }),
        }
    }
}
