//! A deterministic test double for [`LlmProvider`], grounded on the "model
//! script" language implied by spec §8's agent-loop testable properties
//! (scenario 5: "Model script: iteration 1 returns one tool call...
//! iteration 2 returns final content 'ok'").
//!
//! Used by `mesh-agent`'s and `mesh-planner`'s own test suites so their
//! convergence/budget-exhaustion behavior can be verified without a real
//! network call.

use async_trait::async_trait;
use mesh_domain::tool::ToolCall;
use mesh_domain::{Error, Result};
use std::sync::Mutex;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider, Usage};

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Emit this content with no tool calls; the agent loop stops here.
    Final(String),
    /// Emit these tool calls; the agent loop dispatches them and continues.
    ToolCalls(Vec<ToolCall>),
    /// Simulate the model call itself failing (not a tool error).
    Error(String),
}

/// Replays a fixed sequence of [`ScriptedTurn`]s, one per call to `chat`.
/// Calling past the end of the script is a test-authoring bug and panics
/// rather than silently looping — a real model would never be asked to
/// produce more turns than a bounded `max_iterations` allows.
pub struct ScriptedProvider {
    turns: Mutex<std::collections::VecDeque<ScriptedTurn>>,
    calls: Mutex<u32>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            calls: Mutex::new(0),
        }
    }

    /// Script a provider that returns the same tool call on every turn, up
    /// to `repeat` times — enough to drive budget-exhaustion tests (spec §8
    /// scenario 6) without an actually-infinite script.
    pub fn repeating_tool_call(
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        repeat: usize,
    ) -> Self {
        let tool_name = tool_name.into();
        let turns = (0..repeat)
            .map(|i| {
                ScriptedTurn::ToolCalls(vec![ToolCall {
                    call_id: format!("call-{i}"),
                    tool_name: tool_name.clone(),
                    arguments: arguments.clone(),
                }])
            })
            .collect();
        Self::new(turns)
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().expect("lock poisoned")
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse> {
        *self.calls.lock().expect("lock poisoned") += 1;
        let turn = self
            .turns
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .expect("ScriptedProvider called more times than it was scripted for");
        match turn {
            ScriptedTurn::Final(content) => Ok(ChatResponse {
                content,
                tool_calls: Vec::new(),
                finish_reason: "stop".into(),
                model: "scripted".into(),
                usage: Usage::default(),
            }),
            ScriptedTurn::ToolCalls(tool_calls) => Ok(ChatResponse {
                content: String::new(),
                tool_calls,
                finish_reason: "tool_calls".into(),
                model: "scripted".into(),
                usage: Usage::default(),
            }),
            ScriptedTurn::Error(message) => Err(Error::unavailable(message)),
        }
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}
