//! The LLM provider interface (ambient — C5/C8 depend on it).

pub mod openai_compat;
pub mod scripted;
pub mod traits;

pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{ScriptedProvider, ScriptedTurn};
pub use traits::{ChatRequest, ChatResponse, LlmProvider, Usage};

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::tool::Message;

    #[tokio::test]
    async fn scripted_provider_replays_turns_in_order() {
        let provider = ScriptedProvider::new(vec![
            ScriptedTurn::ToolCalls(vec![]),
            ScriptedTurn::Final("ok".into()),
        ]);
        let request = ChatRequest {
            messages: vec![Message::user("hi")],
            tools: vec![],
            temperature: 0.2,
            max_tokens: 100,
            json_mode: false,
            model: "scripted".into(),
        };
        let first = provider.chat(request.clone()).await.unwrap();
        assert_eq!(first.finish_reason, "tool_calls");
        let second = provider.chat(request).await.unwrap();
        assert_eq!(second.content, "ok");
        assert_eq!(provider.call_count(), 2);
    }
}
