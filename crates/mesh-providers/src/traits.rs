//! The `LlmProvider` interface (spec §1: "concrete LLM provider HTTP
//! adapters... only their interface" is in scope; adapters are reference
//! implementations, not the contract).
//!
//! Grounded on `sa-providers::traits::LlmProvider`, simplified to a single
//! non-streaming `chat` call — the agent loop (`mesh-agent`) and planner
//! bridge (`mesh-planner`) never need token-level streaming, only the full
//! assistant turn.

use async_trait::async_trait;
use mesh_domain::tool::{Message, ToolCall, ToolDefinition};
use mesh_domain::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub json_mode: bool,
    pub model: String,
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: String,
    pub model: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool-capable chat model provider. `mesh-agent` and `mesh-planner` are
/// generic over this trait so tests can substitute `ScriptedProvider`
/// instead of making real network calls.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Short identifier used in logs and error messages.
    fn provider_id(&self) -> &str;
}
