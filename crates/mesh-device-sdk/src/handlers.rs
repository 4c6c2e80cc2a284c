//! Reference [`TaskHandler`] implementations for the kinds spec.md §3
//! defines. A device built with this SDK gets `SYSINFO` and `ECHO` for
//! free; `LLM_GENERATE` wraps a configured [`LlmProvider`]; `IMAGE_GENERATE`
//! has no backend specified anywhere in the corpus, so it reports
//! `unavailable` rather than inventing one.

use async_trait::async_trait;
use mesh_domain::Result;
use mesh_providers::{ChatRequest, LlmProvider};
use std::sync::Arc;

use crate::registry::TaskHandler;
use crate::types::TaskContext;

/// Reports OS/arch and process uptime — just enough for the `get_capabilities`
/// tool's callers to sanity-check a device is alive and responsive.
pub struct SysinfoHandler;

#[async_trait]
impl TaskHandler for SysinfoHandler {
    async fn call(&self, _ctx: TaskContext, _input: String) -> Result<String> {
        let report = serde_json::json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        });
        Ok(report.to_string())
    }
}

/// Returns its input verbatim, used in tests and as a connectivity probe.
pub struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    async fn call(&self, _ctx: TaskContext, input: String) -> Result<String> {
        Ok(input)
    }
}

/// Bridges `LLM_GENERATE` to a configured [`LlmProvider`]. Only used for
/// tasks dispatched without the dedicated `RunLLMTask` RPC (e.g. a plan with
/// no prompt-token budget) — the device client's main loop normally answers
/// `RunLLMTask` directly (see `client.rs`) to also report `model_used` and
/// `tokens_generated`, which a generic `TaskHandler` has no slot for.
pub struct LlmGenerateHandler {
    provider: Arc<dyn LlmProvider>,
}

impl LlmGenerateHandler {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl TaskHandler for LlmGenerateHandler {
    async fn call(&self, _ctx: TaskContext, input: String) -> Result<String> {
        let request = ChatRequest {
            messages: vec![mesh_domain::tool::Message::user(input)],
            tools: vec![],
            temperature: 0.2,
            max_tokens: 1024,
            json_mode: false,
            model: String::new(),
        };
        let response = self.provider.chat(request).await?;
        Ok(response.content)
    }
}

/// No image-generation backend is specified anywhere in this system; this
/// handler exists so `IMAGE_GENERATE` fails loudly with `unavailable`
/// instead of silently matching no handler.
pub struct ImageGenerateHandler;

#[async_trait]
impl TaskHandler for ImageGenerateHandler {
    async fn call(&self, _ctx: TaskContext, _input: String) -> Result<String> {
        Err(mesh_domain::Error::unavailable(
            "no image-generation backend is configured on this device",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_providers::ScriptedProvider;
    use mesh_providers::ScriptedTurn;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> TaskContext {
        TaskContext {
            request_id: "r1".into(),
            task_id: "t1".into(),
            job_id: "j1".into(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn sysinfo_reports_os_and_arch() {
        let out = SysinfoHandler.call(ctx(), String::new()).await.unwrap();
        assert!(out.contains(std::env::consts::OS));
    }

    #[tokio::test]
    async fn echo_returns_input_verbatim() {
        let out = EchoHandler.call(ctx(), "hi".into()).await.unwrap();
        assert_eq!(out, "hi");
    }

    #[tokio::test]
    async fn llm_generate_delegates_to_the_provider() {
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedTurn::Final(
            "generated text".into(),
        )]));
        let handler = LlmGenerateHandler::new(provider);
        let out = handler.call(ctx(), "write a haiku".into()).await.unwrap();
        assert_eq!(out, "generated text");
    }

    #[tokio::test]
    async fn image_generate_is_unavailable() {
        let err = ImageGenerateHandler.call(ctx(), String::new()).await.unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::Unavailable);
    }
}
