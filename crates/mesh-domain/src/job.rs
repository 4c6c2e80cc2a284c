//! The `Job`/`Task`/`Plan`/`ReduceSpec` data model (spec §3).
//!
//! Tagged unions over inheritance (spec §9 design note): task kinds, job
//! states, task states, and reduce kinds are closed enums. Adding a new task
//! kind means touching exactly three sites: the plan validator
//! (`mesh-planner`), the cost model (`mesh-cost`), and the dispatcher's
//! kind-to-RPC mapping (`mesh-jobs::dispatch`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────
// Task kind
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Sysinfo,
    Echo,
    LlmGenerate,
    ImageGenerate,
}

impl TaskKind {
    /// The validated kind set from spec §4.5. Parsed from the plan-JSON
    /// `kind` field; unknown strings are rejected by the caller, not here.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SYSINFO" => Some(Self::Sysinfo),
            "ECHO" => Some(Self::Echo),
            "LLM_GENERATE" => Some(Self::LlmGenerate),
            "IMAGE_GENERATE" => Some(Self::ImageGenerate),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Plan / TaskGroup / TaskSpec (pre-materialization)
// ─────────────────────────────────────────────────────────────────────────

/// One task specification inside a [`TaskGroup`], before a device is
/// assigned and before it becomes a job-owned [`Task`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub kind: TaskKind,
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// An unordered set of tasks that execute concurrently (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub tasks: Vec<TaskSpec>,
}

/// Kind of reduction applied to a job's completed tasks (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReduceKind {
    #[default]
    Concat,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReduceSpec {
    pub kind: ReduceKind,
}

/// Ordered sequence of [`TaskGroup`]s (spec §3). Groups execute in order;
/// tasks within a group execute concurrently; later groups see earlier
/// groups' results only through the reduction, never as explicit data flow.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plan {
    pub groups: Vec<TaskGroup>,
}

impl Plan {
    pub fn total_groups(&self) -> usize {
        self.groups.len()
    }

    /// All task ids across the whole plan, in (group, position) order.
    pub fn task_ids(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.tasks.iter().map(|t| t.task_id.as_str()))
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Job / Task (materialized, engine-owned)
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Running,
    Done,
    Failed,
}

/// A task owned by a job (spec §3). Distinct from [`TaskSpec`]: a `Task`
/// carries dispatch/result state a spec doesn't have yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub job_id: String,
    pub kind: TaskKind,
    pub input: String,
    #[serde(default)]
    pub assigned_device_id: String,
    #[serde(default)]
    pub assigned_device_name: String,
    #[serde(default)]
    pub assigned_device_address: String,
    pub state: TaskState,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub error: String,
    pub group_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

impl Task {
    fn from_spec(spec: &TaskSpec, job_id: &str, group_index: usize) -> Self {
        Self {
            task_id: spec.task_id.clone(),
            job_id: job_id.to_string(),
            kind: spec.kind,
            input: spec.input.clone(),
            assigned_device_id: spec.target_device_id.clone().unwrap_or_default(),
            assigned_device_name: String::new(),
            assigned_device_address: String::new(),
            state: TaskState::Queued,
            result: String::new(),
            error: String::new(),
            group_index,
            prompt_tokens: spec.prompt_tokens,
            max_output_tokens: spec.max_output_tokens,
        }
    }

    pub fn mark_done(&mut self, result: String) {
        self.state = TaskState::Done;
        self.result = result;
        self.error.clear();
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = TaskState::Failed;
        self.error = error;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TaskState::Done | TaskState::Failed)
    }
}

/// A job: its plan (materialized as grouped tasks), execution progress, and
/// final reduced result (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub state: JobState,
    /// Materialized tasks, grouped by index (contiguous, starting at 0).
    pub groups: Vec<Vec<Task>>,
    /// Index of the group currently executing (or the next to execute).
    pub current_group: usize,
    pub reduce: ReduceSpec,
    pub final_result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Job {
    /// Materialize a new job from a validated [`Plan`]. State starts at
    /// QUEUED; the engine transitions it to RUNNING when dispatch begins.
    pub fn new(job_id: String, plan: &Plan, reduce: ReduceSpec) -> Self {
        let groups = plan
            .groups
            .iter()
            .enumerate()
            .map(|(gi, g)| {
                g.tasks
                    .iter()
                    .map(|spec| Task::from_spec(spec, &job_id, gi))
                    .collect()
            })
            .collect();
        Self {
            job_id,
            created_at: Utc::now(),
            state: JobState::Queued,
            groups,
            current_group: 0,
            reduce,
            final_result: String::new(),
            summary: None,
        }
    }

    pub fn total_groups(&self) -> usize {
        self.groups.len()
    }

    /// All tasks, in (group_index, position_in_group) order — the order the
    /// CONCAT reducer must use (spec §4.4).
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.groups.iter().flat_map(|g| g.iter())
    }

    pub fn all_tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.groups.iter_mut().flat_map(|g| g.iter_mut())
    }

    pub fn group_terminal(&self, group_index: usize) -> bool {
        self.groups[group_index].iter().all(|t| t.is_terminal())
    }

    pub fn group_failed(&self, group_index: usize) -> bool {
        self.groups[group_index]
            .iter()
            .any(|t| t.state == TaskState::Failed)
    }
}
