//! The planner bridge (C5): turns free text + a device snapshot into a
//! [`Plan`], preferring an external chat model and falling back to a
//! deterministic plan when the AI path is unavailable or its output fails
//! validation.
//!
//! Grounded on the "call a provider, fall back on failure" shape implied by
//! the teacher's compaction boundary (`runtime/compact.rs`: call the model
//! to summarize, and if that fails, keep the raw transcript instead of
//! erroring the turn) — generalized here to planning instead of
//! summarization.

pub mod fallback;
pub mod wire;

use mesh_domain::device::Device;
use mesh_domain::job::{Plan, ReduceSpec};
use mesh_domain::tool::Message;
use mesh_providers::{ChatRequest, LlmProvider};

/// Result of `Plan(text, devices_snapshot)` (spec §4.5/§4.7 `PreviewPlan`).
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub reduce: ReduceSpec,
    pub used_ai: bool,
    pub rationale: String,
    pub notes: String,
}

const PLAN_SCHEMA_INSTRUCTIONS: &str = r#"Respond with a single JSON document matching exactly:
{"groups":[{"index":0,"tasks":[{"task_id":"...","kind":"SYSINFO|ECHO|LLM_GENERATE|IMAGE_GENERATE","input":"...","target_device_id":"...","prompt_tokens":0,"max_output_tokens":0}]}],"reduce":{"kind":"CONCAT"}}
Task ids must be unique across the whole plan. `input` must not be an absolute path or contain "..". You may wrap the JSON in a ```json code fence."#;

/// Produce a plan for `text`, given a snapshot of registered `devices`.
/// When `provider` is `Some`, the AI path is attempted first; any parse or
/// validation failure falls back to the deterministic planner and records
/// the reason in `notes` (spec §4.5: "the failure reason is recorded in
/// notes"). When `provider` is `None`, the fallback runs directly.
pub async fn plan(
    text: &str,
    devices: &[Device],
    provider: Option<&dyn LlmProvider>,
    max_workers: usize,
) -> PlanOutcome {
    if let Some(provider) = provider {
        match plan_with_ai(text, devices, provider).await {
            Ok((plan, reduce)) => {
                return PlanOutcome {
                    plan,
                    reduce,
                    used_ai: true,
                    rationale: "plan generated by the configured chat model".to_string(),
                    notes: String::new(),
                };
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "AI planning path failed validation; using fallback");
                let (plan, reduce, rationale) = fallback::build(devices, max_workers);
                return PlanOutcome {
                    plan,
                    reduce,
                    used_ai: false,
                    rationale,
                    notes: reason,
                };
            }
        }
    }
    let (plan, reduce, rationale) = fallback::build(devices, max_workers);
    PlanOutcome {
        plan,
        reduce,
        used_ai: false,
        rationale,
        notes: "no chat model provider configured".to_string(),
    }
}

async fn plan_with_ai(
    text: &str,
    devices: &[Device],
    provider: &dyn LlmProvider,
) -> Result<(Plan, ReduceSpec), String> {
    let device_summaries: Vec<serde_json::Value> = devices
        .iter()
        .map(|d| {
            serde_json::json!({
                "id": d.id,
                "name": d.name,
                "has_cpu": d.capabilities.has_cpu,
                "has_gpu": d.capabilities.has_gpu,
                "has_npu": d.capabilities.has_npu,
                "has_local_model": d.capabilities.has_local_model,
            })
        })
        .collect();
    let user_message = format!(
        "{PLAN_SCHEMA_INSTRUCTIONS}\n\nUser request: {text}\n\nDevices: {}",
        serde_json::Value::Array(device_summaries)
    );
    let request = ChatRequest {
        messages: vec![
            Message::system("You turn user requests into execution plans for a device mesh."),
            Message::user(user_message),
        ],
        tools: vec![],
        temperature: 0.2,
        max_tokens: 2048,
        json_mode: true,
        model: String::new(),
    };
    let response = provider
        .chat(request)
        .await
        .map_err(|e| format!("chat model call failed: {e}"))?;
    wire::parse_and_validate(&response.content).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::device::{Capabilities, DeviceAddress};
    use mesh_providers::{ScriptedProvider, ScriptedTurn};

    fn device(id: &str) -> Device {
        Device {
            id: id.to_string(),
            name: format!("name-{id}"),
            platform: "linux".into(),
            arch: "x86_64".into(),
            address: DeviceAddress {
                primary: "ws://x".into(),
                secondary: None,
            },
            capabilities: Capabilities::default(),
            local_model: None,
            throughput: Default::default(),
            free_memory_mb: 0,
            last_seen_ms: 0,
        }
    }

    #[tokio::test]
    async fn no_provider_uses_the_fallback() {
        let devices = vec![device("d1")];
        let outcome = plan("do something", &devices, None, 0).await;
        assert!(!outcome.used_ai);
        assert_eq!(outcome.plan.groups[0].tasks.len(), 1);
    }

    #[tokio::test]
    async fn valid_ai_response_is_used_directly() {
        let valid = r#"{"groups":[{"index":0,"tasks":[{"task_id":"t1","kind":"SYSINFO","input":""}]}]}"#;
        let provider = ScriptedProvider::new(vec![ScriptedTurn::Final(valid.to_string())]);
        let devices = vec![device("d1")];
        let outcome = plan("status", &devices, Some(&provider), 0).await;
        assert!(outcome.used_ai);
        assert!(outcome.notes.is_empty());
    }

    #[tokio::test]
    async fn invalid_ai_response_falls_back_with_notes() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::Final("not json at all".to_string())]);
        let devices = vec![device("d1")];
        let outcome = plan("status", &devices, Some(&provider), 0).await;
        assert!(!outcome.used_ai);
        assert!(!outcome.notes.is_empty());
    }

    #[tokio::test]
    async fn model_call_error_falls_back_with_notes() {
        let provider = ScriptedProvider::new(vec![ScriptedTurn::Error("timeout".to_string())]);
        let devices = vec![device("d1")];
        let outcome = plan("status", &devices, Some(&provider), 0).await;
        assert!(!outcome.used_ai);
        assert!(outcome.notes.contains("timeout"));
    }
}
