//! The dispatch seam (spec §4.4 "Dispatch"): `mesh-jobs` never opens a
//! device connection itself. `mesh-coordinator`, which owns the WebSocket
//! transport and the `PendingRequests` correlation table, implements
//! [`TaskDispatcher`] and is handed to the [`crate::JobEngine`] at startup —
//! the same seam shape as `mesh-tools::RoutedBackend`.

use std::time::Duration;

use async_trait::async_trait;
use mesh_domain::job::Task;
use mesh_domain::{Error, Result};

/// Outcome of one child RPC to a device (`RunTask` / `RunLLMTask`).
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub output: String,
    pub error: Option<String>,
}

/// Opens the child RPC for one task, per spec §4.4: `RunTask` for most
/// kinds, `RunLLMTask` for `LLM_GENERATE`. Implementations decide the wire
/// framing; `mesh-jobs` only needs success/failure and the payload.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch_task(
        &self,
        device_id: &str,
        task: &Task,
        timeout: Duration,
    ) -> Result<TaskOutcome>;
}

/// `CONCAT` reduction (spec §4.4): one header + body per task, in
/// (group, position) order, separated by a blank line. A leading one-line
/// warning is prepended when any task failed.
pub fn reduce_concat<'a>(tasks: impl Iterator<Item = &'a Task>) -> String {
    let tasks: Vec<&Task> = tasks.collect();
    let failed = tasks
        .iter()
        .filter(|t| t.state == mesh_domain::job::TaskState::Failed)
        .count();
    let mut out = String::new();
    if failed > 0 {
        out.push_str(&format!(
            "WARNING: {failed} of {} task(s) failed\n\n",
            tasks.len()
        ));
    }
    let bodies: Vec<String> = tasks
        .iter()
        .map(|t| {
            let header = format!(
                "{} ({})",
                if t.assigned_device_name.is_empty() {
                    t.assigned_device_id.as_str()
                } else {
                    t.assigned_device_name.as_str()
                },
                t.task_id
            );
            let body = if t.state == mesh_domain::job::TaskState::Failed {
                format!("ERROR: {}", t.error)
            } else {
                t.result.clone()
            };
            format!("{header}\n{body}")
        })
        .collect();
    out.push_str(&bodies.join("\n\n"));
    out
}

/// Maps a no-eligible-device/explicit-device-missing condition to the
/// `unavailable` error the task record stores (spec §7: "Surface at task
/// level (task FAILED); job continues").
pub fn device_unavailable(reason: impl Into<String>) -> Error {
    Error::unavailable(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::job::{Task, TaskKind, TaskState};

    fn task(id: &str, device_name: &str, state: TaskState, result: &str, error: &str) -> Task {
        Task {
            task_id: id.to_string(),
            job_id: "j1".into(),
            kind: TaskKind::Sysinfo,
            input: String::new(),
            assigned_device_id: format!("id-{device_name}"),
            assigned_device_name: device_name.to_string(),
            assigned_device_address: String::new(),
            state,
            result: result.to_string(),
            error: error.to_string(),
            group_index: 0,
            prompt_tokens: None,
            max_output_tokens: None,
        }
    }

    #[test]
    fn concat_with_no_failures_has_no_warning() {
        let tasks = vec![
            task("t1", "laptop", TaskState::Done, "ok1", ""),
            task("t2", "phone", TaskState::Done, "ok2", ""),
        ];
        let out = reduce_concat(tasks.iter());
        assert!(!out.contains("WARNING"));
        assert!(out.contains("laptop (t1)"));
        assert!(out.contains("ok1"));
        assert!(out.contains("ok2"));
    }

    #[test]
    fn concat_with_a_failure_prepends_a_warning() {
        let tasks = vec![
            task("t1", "laptop", TaskState::Done, "ok1", ""),
            task("t2", "phone", TaskState::Failed, "", "timed out"),
        ];
        let out = reduce_concat(tasks.iter());
        assert!(out.starts_with("WARNING: 1 of 2 task(s) failed"));
        assert!(out.contains("ERROR: timed out"));
    }
}
