//! Shared application state, grounded on `gateway/src/state.rs`'s
//! grouped-by-concern `AppState`: one `Clone`-able struct handed to every
//! axum handler via `State<AppState>`.

use std::collections::HashMap;
use std::sync::Arc;

use mesh_jobs::JobEngine;
use mesh_memory::ChatMemoryStore;
use mesh_providers::LlmProvider;
use mesh_registry::{PendingRequests, Registry};
use mesh_sessions::SessionStore;
use mesh_tools::ToolExecutor;
use tokio::sync::RwLock;

use crate::summarizer::LlmSummarizer;
use crate::transport::{CoordinatorDispatcher, CoordinatorRoutedBackend, DeviceTransport};

/// One session's chat memory, keyed by session id (spec §4.10 `SyncChatMemory`
/// — the crate's own `ChatMemoryStore` holds a single conversation, so the
/// coordinator fans that out per session).
pub type MemoryMap = RwLock<HashMap<String, Arc<ChatMemoryStore<LlmSummarizer>>>>;

#[derive(Clone)]
pub struct AppState {
    // ── Config ──
    pub config: Arc<mesh_domain::config::Config>,

    // ── Identity & sessions (C3) ──
    pub sessions: Arc<SessionStore>,

    // ── Device registry & transport (C1/C2) ──
    pub registry: Arc<Registry>,
    pub transport: Arc<DeviceTransport>,

    // ── Jobs (C4) ──
    pub jobs: Arc<JobEngine<CoordinatorDispatcher>>,

    // ── LLM / planning / agent (C5/C8) ──
    pub llm: Arc<dyn LlmProvider>,
    pub tool_executor: Arc<ToolExecutor<CoordinatorRoutedBackend>>,
    /// The same backend `tool_executor` wraps, held directly so
    /// `ExecuteRoutedCommand` (spec §4.7) can call it without going through
    /// tool-call argument validation — it's a distinct RPC from
    /// `execute_shell_cmd`.
    pub routed_backend: Arc<CoordinatorRoutedBackend>,

    // ── Chat memory (C10) ──
    pub chat_memory: Arc<MemoryMap>,

    // ── Security ──
    pub api_token_hash: Option<Vec<u8>>,
}

impl AppState {
    /// Fetches or lazily creates the chat-memory store for a session,
    /// mirroring the teacher's `CachedUserFacts`-style lazy-insert pattern
    /// in `state.rs`.
    pub async fn memory_for_session(&self, session_id: &str) -> Arc<ChatMemoryStore<LlmSummarizer>> {
        if let Some(store) = self.chat_memory.read().await.get(session_id) {
            return store.clone();
        }
        let mut map = self.chat_memory.write().await;
        map.entry(session_id.to_string())
            .or_insert_with(|| Arc::new(ChatMemoryStore::new(Arc::new(LlmSummarizer::new(self.llm.clone())))))
            .clone()
    }
}

/// Pending in-flight request correlation, kept separate from `AppState` only
/// at the type level — both are reached through `transport`.
pub fn pending_requests(state: &AppState) -> &Arc<PendingRequests> {
    &state.transport.pending
}
