//! `Chat` (spec §4.8, the agent loop) and `SyncChatMemory` (spec §4.10).

use std::time::{Duration, Instant};

use axum::extract::State;
use axum::Json;
use mesh_agent::AgentOutcome;
use mesh_domain::chat_memory::{ChatMemory, MemoryRole};
use mesh_domain::tool::Message;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub iterations: u32,
    pub tool_calls: Vec<mesh_agent::ToolCallRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<AgentOutcome> for ChatResponse {
    fn from(outcome: AgentOutcome) -> Self {
        Self {
            reply: outcome.reply,
            iterations: outcome.iterations,
            tool_calls: outcome.tool_calls,
            error: outcome.error,
        }
    }
}

/// Runs one turn of the agent loop (spec §4.8): seeds `history` with the
/// session's rolling summary + recent messages, appends the new user
/// message, calls `mesh_agent::run`, then records both the user message and
/// the final reply back into chat memory.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    state.sessions.resolve(&req.session_id)?;

    let memory = state.memory_for_session(&req.session_id).await;
    let snapshot = memory.snapshot().await;

    let mut history = Vec::new();
    if !snapshot.summary.is_empty() {
        history.push(Message::system(format!(
            "Conversation summary so far: {}",
            snapshot.summary
        )));
    }
    for m in &snapshot.messages {
        history.push(match m.role {
            MemoryRole::System => Message::system(m.content.clone()),
            MemoryRole::User => Message::user(m.content.clone()),
            MemoryRole::Assistant => Message::assistant(m.content.clone(), vec![]),
        });
    }
    history.push(Message::user(req.message.clone()));

    let deadline = Instant::now() + Duration::from_secs(state.config.server.default_deadline_secs);
    let outcome = mesh_agent::run(
        history,
        state.llm.as_ref(),
        &state.tool_executor,
        state.config.llm.max_iterations,
        &state.config.llm.model_name,
        deadline,
    )
    .await;

    let now_ms = chrono::Utc::now().timestamp_millis();
    memory.add_message(MemoryRole::User, req.message, now_ms).await;
    if outcome.is_success() {
        memory
            .add_message(MemoryRole::Assistant, outcome.reply.clone(), now_ms)
            .await;
    }

    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
pub struct SyncChatMemoryRequest {
    pub session_id: String,
    pub memory: ChatMemory,
}

#[derive(Debug, Serialize)]
pub struct SyncChatMemoryResponse {
    pub replaced: bool,
    pub memory: ChatMemory,
}

pub async fn sync_chat_memory(
    State(state): State<AppState>,
    Json(req): Json<SyncChatMemoryRequest>,
) -> ApiResult<Json<SyncChatMemoryResponse>> {
    state.sessions.resolve(&req.session_id)?;

    let memory = state.memory_for_session(&req.session_id).await;
    let replaced = memory.merge(req.memory).await;
    let snapshot = memory.snapshot().await;

    Ok(Json(SyncChatMemoryResponse {
        replaced,
        memory: snapshot,
    }))
}
