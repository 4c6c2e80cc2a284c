//! The job engine (C4): submission, the per-job background execution loop,
//! and reads.
//!
//! Grounded on the teacher's per-run background-task shape (`runtime/turn.rs`
//! spawns one task per run and mutates a shared, lock-guarded run record as
//! it progresses) — generalized here from "one model turn" to "one job's
//! group-by-group barrier" per spec §4.4's pseudocode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mesh_domain::device::Device;
use mesh_domain::job::{Job, JobState, Plan, ReduceSpec, Task, TaskKind, TaskState};
use mesh_domain::{Error, Result};
use mesh_providers::LlmProvider;
use mesh_registry::Registry;
use tokio::sync::{Mutex, RwLock, Semaphore};
use uuid::Uuid;

use crate::dispatch::{device_unavailable, reduce_concat, TaskDispatcher};

/// Per-task RPC timeout. The spec derives this "from the job's deadline";
/// absent an explicit per-job deadline parameter in the RPC surface, every
/// task gets the same fixed budget.
const TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Result of `SubmitJob` (spec §4.4).
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub summary: String,
}

/// Read-only projection of a job, matching `GetJob`'s return shape
/// (spec §4.7: `{state, tasks, final_result, current_group, total_groups}`).
#[derive(Debug, Clone)]
pub struct JobView {
    pub state: JobState,
    pub tasks: Vec<Task>,
    pub final_result: String,
    pub current_group: usize,
    pub total_groups: usize,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            state: job.state,
            tasks: job.all_tasks().cloned().collect(),
            final_result: job.final_result.clone(),
            current_group: job.current_group,
            total_groups: job.total_groups(),
        }
    }
}

/// Owns every job's record and drives its execution (spec §4.4).
pub struct JobEngine<D: TaskDispatcher + 'static> {
    jobs: RwLock<HashMap<String, Arc<Mutex<Job>>>>,
    registry: Arc<Registry>,
    dispatcher: Arc<D>,
}

impl<D: TaskDispatcher + 'static> JobEngine<D> {
    pub fn new(registry: Arc<Registry>, dispatcher: Arc<D>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            registry,
            dispatcher,
        }
    }

    /// `SubmitJob(session, text, max_workers, plan?, reduce?)`. Validation
    /// failures reject before any job record is created (spec §7: "fails
    /// only on validation errors"). Creation is atomic: the full task tree
    /// materializes before this returns, and before the background runner is
    /// spawned.
    pub async fn submit_job(
        &self,
        text: &str,
        max_workers: usize,
        plan: Option<Plan>,
        reduce: Option<ReduceSpec>,
        provider: Option<&dyn LlmProvider>,
    ) -> Result<JobSummary> {
        let devices = self.registry.list();
        let (plan, reduce, summary) = match plan {
            Some(plan) => {
                mesh_planner::wire::validate_domain(&plan)
                    .map_err(|e| Error::invalid_argument(e.to_string()))?;
                let summary = format!("client-supplied plan with {} task(s)", plan.task_ids().len());
                (plan, reduce.unwrap_or_default(), summary)
            }
            None => {
                let outcome = mesh_planner::plan(text, &devices, provider, max_workers).await;
                (outcome.plan, outcome.reduce, outcome.rationale)
            }
        };

        let job_id = Uuid::new_v4().to_string();
        let job = Job::new(job_id.clone(), &plan, reduce);
        let created_at = job.created_at;
        let job_arc = Arc::new(Mutex::new(job));

        self.jobs
            .write()
            .await
            .insert(job_id.clone(), job_arc.clone());

        let registry = self.registry.clone();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(run_job(job_arc, registry, dispatcher, max_workers));

        Ok(JobSummary {
            job_id,
            created_at,
            summary,
        })
    }

    /// `GetJob(job_id)`: a pure read over a consistent snapshot (spec §4.4:
    /// "Idempotence and cancellation ... GetJob is a pure read").
    pub async fn get_job(&self, job_id: &str) -> Result<JobView> {
        let job_arc = self
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no such job: {job_id}")))?;
        let job = job_arc.lock().await;
        Ok(JobView::from(&*job))
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

/// The background execution loop (spec §4.4's pseudocode), one per job.
async fn run_job<D: TaskDispatcher + 'static>(
    job: Arc<Mutex<Job>>,
    registry: Arc<Registry>,
    dispatcher: Arc<D>,
    max_workers: usize,
) {
    {
        let mut j = job.lock().await;
        j.state = JobState::Running;
    }

    let total_groups = job.lock().await.total_groups();
    let mut failed = false;

    for gi in 0..total_groups {
        {
            let mut j = job.lock().await;
            j.current_group = gi;
        }

        let devices = registry.list();
        let group_len = job.lock().await.groups[gi].len();
        let permits = if max_workers == 0 {
            group_len.max(1)
        } else {
            max_workers
        };
        let semaphore = Arc::new(Semaphore::new(permits));

        let mut round_robin = 0usize;
        let mut handles = Vec::with_capacity(group_len);
        for ti in 0..group_len {
            let (kind, explicit_device) = {
                let j = job.lock().await;
                let t = &j.groups[gi][ti];
                (t.kind, non_empty(&t.assigned_device_id))
            };

            let assignment = resolve_device(kind, explicit_device.as_deref(), &devices, &mut round_robin);

            match assignment {
                Ok(device) => {
                    {
                        let mut j = job.lock().await;
                        let t = &mut j.groups[gi][ti];
                        t.assigned_device_id = device.id.clone();
                        t.assigned_device_name = device.name.clone();
                        t.assigned_device_address = device.address.primary.clone();
                        t.state = TaskState::Running;
                    }
                    let job = job.clone();
                    let dispatcher = dispatcher.clone();
                    let semaphore = semaphore.clone();
                    let device_id = device.id.clone();
                    handles.push(tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await.ok();
                        dispatch_one(job, gi, ti, &device_id, dispatcher.as_ref()).await;
                    }));
                }
                Err(reason) => {
                    let mut j = job.lock().await;
                    j.groups[gi][ti].mark_failed(reason);
                }
            }
        }

        for handle in handles {
            let _ = handle.await;
        }

        if job.lock().await.group_failed(gi) {
            failed = true;
            break;
        }
    }

    let mut j = job.lock().await;
    j.state = if failed { JobState::Failed } else { JobState::Done };
    j.final_result = reduce_concat(j.all_tasks());
}

async fn dispatch_one<D: TaskDispatcher>(
    job: Arc<Mutex<Job>>,
    gi: usize,
    ti: usize,
    device_id: &str,
    dispatcher: &D,
) {
    let task = {
        let j = job.lock().await;
        j.groups[gi][ti].clone()
    };
    let outcome = dispatcher
        .dispatch_task(device_id, &task, TASK_TIMEOUT)
        .await;
    let mut j = job.lock().await;
    let t = &mut j.groups[gi][ti];
    match outcome {
        Ok(result) => match result.error {
            Some(err) => t.mark_failed(err),
            None => t.mark_done(result.output),
        },
        Err(e) => t.mark_failed(e.message),
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Resolves the device for one task (spec §4.4 "Dispatch"): the task's
/// explicit `target_device_id` if set, otherwise round-robin over devices
/// eligible for `kind` (LLM_GENERATE requires `has_local_model`).
fn resolve_device(
    kind: TaskKind,
    explicit_device_id: Option<&str>,
    devices: &[Device],
    round_robin: &mut usize,
) -> std::result::Result<Device, String> {
    if let Some(id) = explicit_device_id {
        return devices
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| device_unavailable(format!("target device not found: {id}")).message);
    }
    let eligible: Vec<&Device> = devices
        .iter()
        .filter(|d| kind != TaskKind::LlmGenerate || d.capabilities.has_local_model)
        .collect();
    if eligible.is_empty() {
        return Err(device_unavailable("no eligible device for task").message);
    }
    let device = eligible[*round_robin % eligible.len()].clone();
    *round_robin += 1;
    Ok(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mesh_domain::device::{Capabilities, DeviceAddress};
    use mesh_domain::job::{ReduceKind, TaskGroup, TaskSpec};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn device(id: &str, has_local_model: bool) -> Device {
        Device {
            id: id.to_string(),
            name: format!("name-{id}"),
            platform: "linux".into(),
            arch: "x86_64".into(),
            address: DeviceAddress {
                primary: format!("ws://{id}"),
                secondary: None,
            },
            capabilities: Capabilities {
                has_cpu: true,
                has_gpu: false,
                has_npu: false,
                can_screen_capture: false,
                has_local_model,
            },
            local_model: None,
            throughput: Default::default(),
            free_memory_mb: 1024,
            last_seen_ms: 0,
        }
    }

    struct FakeDispatcher {
        fail_device: Option<String>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TaskDispatcher for FakeDispatcher {
        async fn dispatch_task(
            &self,
            device_id: &str,
            task: &Task,
            _timeout: Duration,
        ) -> Result<crate::dispatch::TaskOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_device.as_deref() == Some(device_id) {
                return Ok(crate::dispatch::TaskOutcome {
                    output: String::new(),
                    error: Some("simulated failure".into()),
                });
            }
            Ok(crate::dispatch::TaskOutcome {
                output: format!("result for {}", task.task_id),
                error: None,
            })
        }
    }

    fn plan_with_tasks(task_ids: &[&str]) -> Plan {
        Plan {
            groups: vec![TaskGroup {
                tasks: task_ids
                    .iter()
                    .map(|id| TaskSpec {
                        task_id: id.to_string(),
                        kind: TaskKind::Sysinfo,
                        input: String::new(),
                        target_device_id: None,
                        prompt_tokens: None,
                        max_output_tokens: None,
                    })
                    .collect(),
            }],
        }
    }

    #[tokio::test]
    async fn submit_job_rejects_invalid_client_supplied_plan() {
        let registry = Arc::new(Registry::new());
        let dispatcher = Arc::new(FakeDispatcher {
            fail_device: None,
            calls: AtomicUsize::new(0),
        });
        let engine = JobEngine::new(registry, dispatcher);
        let mut plan = plan_with_tasks(&["t1"]);
        plan.groups[0].tasks.push(plan.groups[0].tasks[0].clone());
        let err = engine
            .submit_job("text", 0, Some(plan), None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::InvalidArgument);
    }

    #[tokio::test]
    async fn submit_then_get_job_runs_to_done() {
        let registry = Arc::new(Registry::new());
        registry.upsert(device("d1", false));
        let dispatcher = Arc::new(FakeDispatcher {
            fail_device: None,
            calls: AtomicUsize::new(0),
        });
        let engine = JobEngine::new(registry, dispatcher);
        let plan = plan_with_tasks(&["t1", "t2"]);
        let summary = engine
            .submit_job("text", 0, Some(plan), None, None)
            .await
            .unwrap();

        let mut view = engine.get_job(&summary.job_id).await.unwrap();
        let mut attempts = 0;
        while view.state != JobState::Done && attempts < 50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            view = engine.get_job(&summary.job_id).await.unwrap();
            attempts += 1;
        }
        assert_eq!(view.state, JobState::Done);
        assert!(view.final_result.contains("result for t1"));
        assert!(view.final_result.contains("result for t2"));
        assert!(!view.final_result.contains("WARNING"));
    }

    #[tokio::test]
    async fn a_failed_task_fails_the_job_and_warns_in_the_reduction() {
        let registry = Arc::new(Registry::new());
        registry.upsert(device("bad", false));
        let dispatcher = Arc::new(FakeDispatcher {
            fail_device: Some("bad".to_string()),
            calls: AtomicUsize::new(0),
        });
        let engine = JobEngine::new(registry, dispatcher);
        let plan = plan_with_tasks(&["t1"]);
        let summary = engine
            .submit_job("text", 0, Some(plan), None, None)
            .await
            .unwrap();

        let mut view = engine.get_job(&summary.job_id).await.unwrap();
        let mut attempts = 0;
        while view.state == JobState::Queued || view.state == JobState::Running {
            tokio::time::sleep(Duration::from_millis(10)).await;
            view = engine.get_job(&summary.job_id).await.unwrap();
            attempts += 1;
            if attempts > 50 {
                break;
            }
        }
        assert_eq!(view.state, JobState::Failed);
        assert!(view.final_result.starts_with("WARNING"));
    }

    #[tokio::test]
    async fn llm_generate_tasks_only_go_to_devices_with_a_local_model() {
        let registry = Arc::new(Registry::new());
        registry.upsert(device("no-model", false));
        registry.upsert(device("has-model", true));
        let dispatcher = Arc::new(FakeDispatcher {
            fail_device: None,
            calls: AtomicUsize::new(0),
        });
        let engine = JobEngine::new(registry, dispatcher);
        let plan = Plan {
            groups: vec![TaskGroup {
                tasks: vec![TaskSpec {
                    task_id: "t1".into(),
                    kind: TaskKind::LlmGenerate,
                    input: String::new(),
                    target_device_id: None,
                    prompt_tokens: None,
                    max_output_tokens: None,
                }],
            }],
        };
        let summary = engine
            .submit_job("text", 0, Some(plan), Some(ReduceSpec { kind: ReduceKind::Concat }), None)
            .await
            .unwrap();

        let mut view = engine.get_job(&summary.job_id).await.unwrap();
        let mut attempts = 0;
        while view.state != JobState::Done && attempts < 50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            view = engine.get_job(&summary.job_id).await.unwrap();
            attempts += 1;
        }
        assert_eq!(view.tasks[0].assigned_device_id, "has-model");
    }

    #[test]
    fn resolve_device_honors_explicit_target() {
        let devices = vec![device("d1", false), device("d2", false)];
        let mut rr = 0;
        let picked = resolve_device(TaskKind::Sysinfo, Some("d2"), &devices, &mut rr).unwrap();
        assert_eq!(picked.id, "d2");
    }

    #[test]
    fn resolve_device_round_robins_across_calls() {
        let devices = vec![device("d1", false), device("d2", false)];
        let mut rr = 0;
        let first = resolve_device(TaskKind::Sysinfo, None, &devices, &mut rr).unwrap();
        let second = resolve_device(TaskKind::Sysinfo, None, &devices, &mut rr).unwrap();
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn resolve_device_fails_when_no_device_has_a_local_model() {
        let devices = vec![device("d1", false)];
        let mut rr = 0;
        assert!(resolve_device(TaskKind::LlmGenerate, None, &devices, &mut rr).is_err());
    }
}
