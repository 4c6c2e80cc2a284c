//! The `ChatMemory` data model (spec §3/§4.10): a bounded, ordered log of
//! messages plus a rolling summary, with last-writer-wins merge semantics.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryMessage {
    pub role: MemoryRole,
    pub content: String,
    pub timestamp_ms: i64,
}

/// Stable JSON shape for peer sync and on-disk persistence (spec §4.10/§6).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ChatMemory {
    pub version: u64,
    pub last_updated_ms: i64,
    pub summary: String,
    pub messages: Vec<MemoryMessage>,
}
