//! Core types for task handling: context and the SDK-level error type.

use tokio_util::sync::CancellationToken;

/// Context provided to every task handler invocation.
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// Correlation id — echoed back in the `task_result`.
    pub request_id: String,
    pub task_id: String,
    pub job_id: String,
    /// Cancelled if the connection drops or the process shuts down.
    pub cancel: CancellationToken,
}

/// Top-level SDK error, distinct from `mesh_domain::Error` (which is the
/// wire-level taxonomy) — this covers connection lifecycle failures that
/// never reach the coordinator as an RPC response.
#[derive(thiserror::Error, Debug)]
pub enum DeviceSdkError {
    #[error("config: {0}")]
    Config(String),
    #[error("handshake: {0}")]
    Handshake(String),
    #[error("reconnect exhausted after {0} attempts")]
    ReconnectExhausted(u32),
    #[error("shutdown")]
    Shutdown,
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
