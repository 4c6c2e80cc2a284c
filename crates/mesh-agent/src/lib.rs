//! The agent loop (C8): an iterative tool-calling controller over a
//! tool-capable chat model, bounded by an iteration budget (spec §4.8).
//!
//! Grounded on the teacher's turn loop (`gateway/src/runtime/turn.rs`):
//! call the model, dispatch any tool calls it returns, append results, and
//! repeat until the model stops calling tools or a budget is exhausted.
//! Unlike the teacher's loop — which dispatches a turn's tool calls
//! concurrently and streams events over an mpsc channel — this one dispatches
//! tool calls **sequentially** within an iteration and returns a single
//! batched outcome, per spec §4.8's invariant that "the N-th tool message
//! corresponds to the N-th call"; concurrent dispatch cannot guarantee that
//! ordering against an executor with shared state (the tool catalog
//! forwards to devices whose responses can arrive out of order).

use std::time::{Duration, Instant};

use mesh_domain::tool::{Message, ToolCall};
use mesh_providers::{ChatRequest, LlmProvider};
use mesh_tools::{RoutedBackend, ToolExecutor};
use serde::{Deserialize, Serialize};

/// Default iteration budget (spec §4.8).
pub const DEFAULT_MAX_ITERATIONS: u32 = 8;

/// One dispatched tool call and its result, as it appears in the tool-call
/// log returned alongside every outcome (including error outcomes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub result: serde_json::Value,
}

/// Result of running the agent loop to completion, to a halting error, or to
/// budget exhaustion. `error` is set exactly on the latter two cases; `reply`
/// carries the final assistant content only on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub reply: String,
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs the loop starting from `history` (system + prior turns + prior tool
/// results, per spec §4.8 — the caller is responsible for seeding the user's
/// new message into `history` before calling this). `deadline` bounds the
/// whole invocation; it is re-checked before every model call so a slow tool
/// dispatch can't blow past it unnoticed.
pub async fn run<B: RoutedBackend>(
    mut history: Vec<Message>,
    provider: &dyn LlmProvider,
    executor: &ToolExecutor<B>,
    max_iterations: u32,
    model: &str,
    deadline: Instant,
) -> AgentOutcome {
    let tools = mesh_tools::schema::catalog();
    let mut tool_calls_log = Vec::new();

    for iteration in 1..=max_iterations {
        let remaining = match deadline.checked_duration_since(Instant::now()) {
            Some(d) if d > Duration::ZERO => d,
            _ => {
                return AgentOutcome {
                    reply: String::new(),
                    iterations: iteration - 1,
                    tool_calls: tool_calls_log,
                    error: Some("deadline exceeded".to_string()),
                }
            }
        };

        let request = ChatRequest {
            messages: history.clone(),
            tools: tools.clone(),
            temperature: 0.2,
            max_tokens: 2048,
            json_mode: false,
            model: model.to_string(),
        };

        let response = match tokio::time::timeout(remaining, provider.chat(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "agent loop halted: model call failed");
                return AgentOutcome {
                    reply: String::new(),
                    iterations: iteration,
                    tool_calls: tool_calls_log,
                    error: Some(format!("chat model call failed: {e}")),
                };
            }
            Err(_) => {
                return AgentOutcome {
                    reply: String::new(),
                    iterations: iteration,
                    tool_calls: tool_calls_log,
                    error: Some("deadline exceeded".to_string()),
                }
            }
        };

        if !response.has_tool_calls() {
            return AgentOutcome {
                reply: response.content,
                iterations: iteration,
                tool_calls: tool_calls_log,
                error: None,
            };
        }

        history.push(Message::assistant(
            response.content.clone(),
            response.tool_calls.clone(),
        ));

        for call in &response.tool_calls {
            dispatch_one(call, executor, &mut history, &mut tool_calls_log).await;
        }
    }

    AgentOutcome {
        reply: String::new(),
        iterations: max_iterations,
        tool_calls: tool_calls_log,
        error: Some(format!(
            "iteration budget of {max_iterations} exceeded without a final reply"
        )),
    }
}

async fn dispatch_one<B: RoutedBackend>(
    call: &ToolCall,
    executor: &ToolExecutor<B>,
    history: &mut Vec<Message>,
    log: &mut Vec<ToolCallRecord>,
) {
    let result = executor.dispatch(&call.tool_name, call.arguments.clone()).await;
    let serialized = result.to_string();
    history.push(Message::tool_result(call.call_id.clone(), serialized));
    log.push(ToolCallRecord {
        call_id: call.call_id.clone(),
        tool_name: call.tool_name.clone(),
        arguments: call.arguments.clone(),
        result,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mesh_domain::file::{ReadFileRequest, ReadFileResponse};
    use mesh_domain::Result;
    use mesh_providers::{ScriptedProvider, ScriptedTurn};
    use mesh_tools::{CapabilitySummary, RoutedExecResult};
    use serde_json::json;

    struct FakeBackend;

    #[async_trait]
    impl RoutedBackend for FakeBackend {
        fn capability_snapshot(&self, _include_benchmarks: bool) -> Vec<CapabilitySummary> {
            vec![]
        }

        async fn execute_routed_command(
            &self,
            _device_id: Option<&str>,
            _command: &str,
            _timeout: Duration,
            _working_dir: Option<&str>,
        ) -> Result<RoutedExecResult> {
            unreachable!("not exercised by these tests")
        }

        async fn read_file(
            &self,
            _request: ReadFileRequest,
            _timeout: Duration,
        ) -> Result<ReadFileResponse> {
            unreachable!("not exercised by these tests")
        }
    }

    fn executor() -> ToolExecutor<FakeBackend> {
        ToolExecutor::new(std::sync::Arc::new(FakeBackend))
    }

    fn call(id: &str) -> ToolCall {
        ToolCall {
            call_id: id.to_string(),
            tool_name: "get_capabilities".to_string(),
            arguments: json!({}),
        }
    }

    #[tokio::test]
    async fn converges_after_one_tool_call_and_a_final_reply() {
        let provider = ScriptedProvider::new(vec![
            ScriptedTurn::ToolCalls(vec![call("c1")]),
            ScriptedTurn::Final("ok".to_string()),
        ]);
        let exec = executor();
        let outcome = run(
            vec![Message::user("status please")],
            &provider,
            &exec,
            DEFAULT_MAX_ITERATIONS,
            "",
            Instant::now() + Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.tool_calls.len(), 1);
        assert_eq!(outcome.reply, "ok");
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn exhausting_the_iteration_budget_reports_an_error_with_the_full_log() {
        let provider = ScriptedProvider::repeating_tool_call("get_capabilities", json!({}), 3);
        let exec = executor();
        let outcome = run(
            vec![Message::user("loop forever")],
            &provider,
            &exec,
            3,
            "",
            Instant::now() + Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.tool_calls.len(), 3);
        assert!(!outcome.is_success());
        assert!(outcome.error.unwrap().contains("budget"));
    }

    #[tokio::test]
    async fn a_model_call_error_halts_the_loop_with_the_partial_log() {
        let provider = ScriptedProvider::new(vec![
            ScriptedTurn::ToolCalls(vec![call("c1")]),
            ScriptedTurn::Error("provider unavailable".to_string()),
        ]);
        let exec = executor();
        let outcome = run(
            vec![Message::user("status please")],
            &provider,
            &exec,
            DEFAULT_MAX_ITERATIONS,
            "",
            Instant::now() + Duration::from_secs(5),
        )
        .await;
        assert_eq!(outcome.tool_calls.len(), 1);
        assert!(outcome.error.unwrap().contains("provider unavailable"));
    }

    #[tokio::test]
    async fn an_already_expired_deadline_halts_before_any_model_call() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::Final("unreachable".to_string())]);
        let exec = executor();
        let outcome = run(
            vec![Message::user("hi")],
            &provider,
            &exec,
            DEFAULT_MAX_ITERATIONS,
            "",
            Instant::now() - Duration::from_secs(1),
        )
        .await;
        assert_eq!(outcome.iterations, 0);
        assert_eq!(provider.call_count(), 0);
        assert!(outcome.error.unwrap().contains("deadline"));
    }
}
