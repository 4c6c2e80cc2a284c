//! A non-panicking stand-in for a real chat-model endpoint, used when
//! `MESH_LLM_PROVIDER=scripted` (spec §6): useful for running the
//! coordinator without a live model endpoint, e.g. demos and smoke tests.
//!
//! `mesh_providers::ScriptedProvider` plays the same role in that crate's
//! own test suite, but panics once its finite turn list is exhausted — a
//! fine contract for a test double, a bad one for a long-running server.
//! This provider never panics: every call beyond any canned behavior just
//! returns a flat acknowledgement with no tool calls, so the agent loop
//! always terminates in one iteration instead of erroring out.

use async_trait::async_trait;
use mesh_domain::Result;
use mesh_providers::{ChatRequest, ChatResponse, LlmProvider, Usage};

pub struct OfflineProvider;

#[async_trait]
impl LlmProvider for OfflineProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        Ok(ChatResponse {
            content: "offline mode: no model endpoint configured".to_string(),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            model: request.model,
            usage: Usage::default(),
        })
    }

    fn provider_id(&self) -> &str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::tool::Message;

    #[tokio::test]
    async fn never_emits_tool_calls() {
        let provider = OfflineProvider;
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            tools: vec![],
            temperature: 0.2,
            max_tokens: 100,
            json_mode: false,
            model: "offline".into(),
        };
        let response = provider.chat(request).await.unwrap();
        assert!(!response.has_tool_calls());
        assert_eq!(response.finish_reason, "stop");
    }
}
