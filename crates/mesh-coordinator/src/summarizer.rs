//! The chat-memory summarizer (spec §4.10): folds aged-out messages into the
//! running summary using the same chat-model provider the agent loop and
//! planner bridge use.
//!
//! Grounded on the teacher's `runtime/compact.rs` compaction boundary: ask
//! the model to fold, and on any failure keep going with something
//! reasonable rather than erroring the whole path — here, falling back to
//! plain concatenation like `mesh_memory::ConcatSummarizer`.

use std::sync::Arc;

use async_trait::async_trait;
use mesh_domain::chat_memory::MemoryMessage;
use mesh_domain::tool::Message;
use mesh_memory::Summarizer;
use mesh_providers::{ChatRequest, LlmProvider};

pub struct LlmSummarizer {
    provider: Arc<dyn LlmProvider>,
}

impl LlmSummarizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, prior_summary: &str, folded: &[MemoryMessage]) -> String {
        let transcript = folded
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Fold these older messages into the running summary. \
             Prior summary: {prior_summary}\n\nMessages:\n{transcript}\n\n\
             Respond with only the updated summary text."
        );
        let request = ChatRequest {
            messages: vec![
                Message::system("You maintain a terse running summary of a conversation."),
                Message::user(prompt),
            ],
            tools: vec![],
            temperature: 0.2,
            max_tokens: 512,
            json_mode: false,
            model: String::new(),
        };
        match self.provider.chat(request).await {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            _ => {
                let mut out = prior_summary.to_string();
                for m in folded {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(&m.content);
                }
                out
            }
        }
    }
}
