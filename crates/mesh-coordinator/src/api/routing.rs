//! `ExecuteRoutedCommand` (spec §4.2/§4.7): `command` is a program name,
//! `args` separate tokens, not a shell string. The underlying
//! `RoutedBackend` (and the device-side handler) only understand a single
//! shell command string, so this handler quotes each argument and joins
//! them — the same simplification `execute_shell_cmd`'s tool surface makes.

use std::time::Duration;

use axum::extract::State;
use axum::Json;
use mesh_domain::routing::RoutingPolicy;
use mesh_tools::RoutedBackend;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteRoutedCommandRequest {
    pub session_id: String,
    #[serde(default = "default_policy")]
    pub policy: RoutingPolicy,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_policy() -> RoutingPolicy {
    RoutingPolicy::BestAvailable
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Serialize)]
pub struct ExecuteRoutedCommandResponse {
    pub output: String,
    pub error: String,
    pub selected_device_id: String,
    pub selected_device_name: String,
    pub selected_device_addr: String,
    pub total_time_ms: u64,
    pub executed_locally: bool,
}

pub async fn execute_routed_command(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRoutedCommandRequest>,
) -> ApiResult<Json<ExecuteRoutedCommandResponse>> {
    state.sessions.resolve(&req.session_id)?;

    // Resolve the requested policy up front, over the full six-mode
    // selection engine (spec §4.2), rather than only special-casing
    // `ForceDeviceId` and leaving every other mode to fall back to
    // `BEST_AVAILABLE`. `resolve_device` surfaces `failed_precondition`/
    // `not_found` exactly as `mesh_registry::select` reports them.
    let selection = state.transport.resolve_device(&req.policy)?;
    let command = join_command(&req.command, &req.args);

    let result = state
        .routed_backend
        .execute_routed_command(
            Some(selection.device_id.as_str()),
            &command,
            Duration::from_secs(req.timeout_secs),
            req.working_dir.as_deref(),
        )
        .await?;

    let selected_device_addr = state
        .registry
        .get(&result.selected_device_id)
        .map(|d| d.address.primary)
        .unwrap_or_default();

    Ok(Json(ExecuteRoutedCommandResponse {
        output: result.output,
        error: result.error,
        selected_device_id: result.selected_device_id,
        selected_device_name: result.selected_device_name,
        selected_device_addr,
        total_time_ms: result.time_ms,
        executed_locally: result.executed_locally,
    }))
}

/// Quotes each argument POSIX-shell-style and joins them onto `program`.
fn join_command(program: &str, args: &[String]) -> String {
    let mut out = shell_quote(program);
    for arg in args {
        out.push(' ');
        out.push_str(&shell_quote(arg));
    }
    out
}

fn shell_quote(token: &str) -> String {
    if !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:=".contains(c)) {
        return token.to_string();
    }
    format!("'{}'", token.replace('\'', "'\\''"))
}
