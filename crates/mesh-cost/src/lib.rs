//! The cost estimator (C6): per-device latency/memory prediction over a
//! plan using advertised throughput.
//!
//! A pure module — no registry or RPC dependency — grounded purely on the
//! per-kind cost table in spec §4.6. There is no single teacher file this
//! maps to; the composition shape (max within a group, sum across groups)
//! mirrors the job engine's own group-barrier semantics in
//! `runtime/turn.rs`-style sequential phases, just computed rather than
//! executed.

use mesh_domain::device::Device;
use mesh_domain::job::{Plan, TaskKind, TaskSpec};
use serde::{Deserialize, Serialize};

/// Prefill/decode tokens-per-second fallback used when a device hasn't
/// advertised real numbers (spec §4.6 table).
const LAPTOP_DEFAULT_PREFILL_TPS: f64 = 300.0;
const LAPTOP_DEFAULT_DECODE_TPS: f64 = 30.0;
const PHONE_DEFAULT_PREFILL_TPS: f64 = 120.0;
const PHONE_DEFAULT_DECODE_TPS: f64 = 12.0;

/// Memory footprint assumed for an LLM_GENERATE step when the device
/// doesn't expose a real figure. The spec leaves the constant to the
/// implementer ("implementer chooses a constant if unknown").
const LLM_GENERATE_DEFAULT_MEMORY_MB: u64 = 512;

/// Cost of one task on one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCost {
    pub task_id: String,
    pub predicted_ms: f64,
    pub predicted_memory_mb: u64,
    pub unknown_cost: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Aggregate cost of an entire plan, assuming it ran on one candidate
/// device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCost {
    pub device_id: String,
    pub device_name: String,
    pub total_predicted_ms: f64,
    pub peak_memory_mb: u64,
    /// `None` when the device hasn't advertised `free_memory_mb`.
    pub ram_sufficient: Option<bool>,
    pub has_unknown_costs: bool,
    pub task_costs: Vec<TaskCost>,
}

/// Full `PreviewPlanCost` result (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCostReport {
    pub device_costs: Vec<DeviceCost>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_device_name: Option<String>,
    pub has_unknown_costs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Cost of one task kind, given the candidate device's advertised
/// throughput (spec §4.6's per-kind table).
pub fn cost_for_task(spec: &TaskSpec, device: &Device) -> TaskCost {
    match spec.kind {
        TaskKind::LlmGenerate => {
            let prompt_tokens = spec.prompt_tokens.unwrap_or(0) as f64;
            let max_output_tokens = spec.max_output_tokens.unwrap_or(0) as f64;
            let (prefill_tps, decode_tps, notes) = resolve_throughput(device);
            let predicted_ms =
                1000.0 * (prompt_tokens / prefill_tps + max_output_tokens / decode_tps);
            TaskCost {
                task_id: spec.task_id.clone(),
                predicted_ms,
                predicted_memory_mb: LLM_GENERATE_DEFAULT_MEMORY_MB,
                unknown_cost: false,
                notes,
            }
        }
        TaskKind::Sysinfo | TaskKind::Echo => TaskCost {
            task_id: spec.task_id.clone(),
            predicted_ms: 10.0,
            predicted_memory_mb: 0,
            unknown_cost: false,
            notes: None,
        },
        TaskKind::ImageGenerate => TaskCost {
            task_id: spec.task_id.clone(),
            predicted_ms: 250.0,
            predicted_memory_mb: 0,
            unknown_cost: true,
            notes: Some("IMAGE_GENERATE cost is not modeled; using a flat placeholder".into()),
        },
    }
}

/// Falls back to a platform default when a device hasn't advertised real
/// prefill/decode throughput, per spec §4.6's table. `platform` strings are
/// matched loosely ("phone"/"android"/"ios" → phone default, else laptop).
fn resolve_throughput(device: &Device) -> (f64, f64, Option<String>) {
    let has_real = device.throughput.prefill_tps > 0.0 && device.throughput.decode_tps > 0.0;
    if has_real {
        return (
            device.throughput.prefill_tps,
            device.throughput.decode_tps,
            None,
        );
    }
    let platform = device.platform.to_lowercase();
    let is_phone = platform.contains("phone") || platform.contains("android") || platform.contains("ios");
    if is_phone {
        (
            PHONE_DEFAULT_PREFILL_TPS,
            PHONE_DEFAULT_DECODE_TPS,
            Some("prefill/decode throughput unknown; used phone platform defaults".into()),
        )
    } else {
        (
            LAPTOP_DEFAULT_PREFILL_TPS,
            LAPTOP_DEFAULT_DECODE_TPS,
            Some("prefill/decode throughput unknown; used laptop platform defaults".into()),
        )
    }
}

/// Estimate the plan's cost as if it executed entirely on each of
/// `devices`, and recommend the cheapest device with sufficient RAM.
pub fn estimate_plan_cost(plan: &Plan, devices: &[Device]) -> PlanCostReport {
    let mut device_costs: Vec<DeviceCost> = devices
        .iter()
        .map(|device| estimate_for_device(plan, device))
        .collect();

    device_costs.sort_by(|a, b| a.device_id.cmp(&b.device_id));

    let recommended = device_costs
        .iter()
        .filter(|dc| dc.ram_sufficient != Some(false))
        .min_by(|a, b| {
            a.total_predicted_ms
                .partial_cmp(&b.total_predicted_ms)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

    let (recommended_device_id, recommended_device_name) = match recommended {
        Some(dc) => (Some(dc.device_id.clone()), Some(dc.device_name.clone())),
        None => (None, None),
    };

    let has_unknown_costs =
        !device_costs.is_empty() && device_costs.iter().all(|dc| dc.has_unknown_costs);
    let warning = if has_unknown_costs {
        Some("every candidate device has unknown-cost tasks in this plan; estimates are unreliable".to_string())
    } else {
        None
    };

    PlanCostReport {
        device_costs,
        recommended_device_id,
        recommended_device_name,
        has_unknown_costs,
        warning,
    }
}

fn estimate_for_device(plan: &Plan, device: &Device) -> DeviceCost {
    let mut total_ms = 0.0;
    let mut peak_memory_mb = 0u64;
    let mut has_unknown_costs = false;
    let mut task_costs = Vec::new();

    for group in &plan.groups {
        let mut group_ms: f64 = 0.0;
        for spec in &group.tasks {
            let cost = cost_for_task(spec, device);
            group_ms = group_ms.max(cost.predicted_ms);
            peak_memory_mb = peak_memory_mb.max(cost.predicted_memory_mb);
            has_unknown_costs = has_unknown_costs || cost.unknown_cost;
            task_costs.push(cost);
        }
        total_ms += group_ms;
    }

    let ram_sufficient = if device.free_memory_mb > 0 {
        Some(peak_memory_mb <= device.free_memory_mb)
    } else {
        None
    };

    DeviceCost {
        device_id: device.id.clone(),
        device_name: device.name.clone(),
        total_predicted_ms: total_ms,
        peak_memory_mb,
        ram_sufficient,
        has_unknown_costs,
        task_costs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::device::{Capabilities, DeviceAddress, Throughput};
    use mesh_domain::job::{TaskGroup, TaskSpec};

    fn device(id: &str, prefill_tps: f64, decode_tps: f64, free_memory_mb: u64) -> Device {
        Device {
            id: id.to_string(),
            name: format!("name-{id}"),
            platform: "laptop".into(),
            arch: "x86_64".into(),
            address: DeviceAddress {
                primary: "ws://x".into(),
                secondary: None,
            },
            capabilities: Capabilities::default(),
            local_model: None,
            throughput: Throughput {
                prefill_tps,
                decode_tps,
            },
            free_memory_mb,
            last_seen_ms: 0,
        }
    }

    fn llm_task(task_id: &str, prompt_tokens: u32, max_output_tokens: u32) -> TaskSpec {
        TaskSpec {
            task_id: task_id.to_string(),
            kind: TaskKind::LlmGenerate,
            input: String::new(),
            target_device_id: None,
            prompt_tokens: Some(prompt_tokens),
            max_output_tokens: Some(max_output_tokens),
        }
    }

    #[test]
    fn llm_generate_cost_matches_formula_within_a_millisecond() {
        let device = device("d1", 300.0, 30.0, 0);
        let spec = llm_task("t1", 300, 150);
        let cost = cost_for_task(&spec, &device);
        assert!((cost.predicted_ms - 6000.0).abs() < 1.0);
    }

    #[test]
    fn unknown_throughput_falls_back_to_laptop_defaults() {
        let device = device("d1", 0.0, 0.0, 0);
        let spec = llm_task("t1", 300, 30);
        let cost = cost_for_task(&spec, &device);
        assert!((cost.predicted_ms - (1000.0 * (300.0 / 300.0 + 30.0 / 30.0))).abs() < 1.0);
        assert!(cost.notes.is_some());
    }

    #[test]
    fn sysinfo_and_echo_are_ten_milliseconds_zero_memory() {
        let device = device("d1", 300.0, 30.0, 0);
        let spec = TaskSpec {
            task_id: "t1".into(),
            kind: TaskKind::Sysinfo,
            input: String::new(),
            target_device_id: None,
            prompt_tokens: None,
            max_output_tokens: None,
        };
        let cost = cost_for_task(&spec, &device);
        assert_eq!(cost.predicted_ms, 10.0);
        assert_eq!(cost.predicted_memory_mb, 0);
        assert!(!cost.unknown_cost);
    }

    #[test]
    fn image_generate_is_flagged_unknown_cost() {
        let device = device("d1", 300.0, 30.0, 0);
        let spec = TaskSpec {
            task_id: "t1".into(),
            kind: TaskKind::ImageGenerate,
            input: String::new(),
            target_device_id: None,
            prompt_tokens: None,
            max_output_tokens: None,
        };
        let cost = cost_for_task(&spec, &device);
        assert!(cost.unknown_cost);
    }

    #[test]
    fn two_groups_of_two_tasks_sum_group_maxes() {
        let device = device("d1", 300.0, 30.0, 0);
        let plan = Plan {
            groups: vec![
                TaskGroup {
                    tasks: vec![llm_task("a", 300, 30), llm_task("b", 600, 30)],
                },
                TaskGroup {
                    tasks: vec![llm_task("c", 300, 30), llm_task("d", 300, 60)],
                },
            ],
        };
        let report = estimate_for_device(&plan, &device);
        let ms_a = cost_for_task(&plan.groups[0].tasks[0], &device).predicted_ms;
        let ms_b = cost_for_task(&plan.groups[0].tasks[1], &device).predicted_ms;
        let ms_c = cost_for_task(&plan.groups[1].tasks[0], &device).predicted_ms;
        let ms_d = cost_for_task(&plan.groups[1].tasks[1], &device).predicted_ms;
        let expected = ms_a.max(ms_b) + ms_c.max(ms_d);
        assert!((report.total_predicted_ms - expected).abs() < 1.0);
    }

    #[test]
    fn recommends_cheapest_device_with_sufficient_ram() {
        let plan = Plan {
            groups: vec![TaskGroup {
                tasks: vec![llm_task("a", 300, 30)],
            }],
        };
        let slow_but_ram_ok = device("slow", 100.0, 10.0, 4096);
        let fast_but_no_ram = {
            let mut d = device("fast", 1000.0, 1000.0, 4096);
            d.free_memory_mb = 1; // insufficient for the 512MB assumed footprint
            d
        };
        let report = estimate_plan_cost(&plan, &[slow_but_ram_ok, fast_but_no_ram]);
        assert_eq!(report.recommended_device_id.as_deref(), Some("slow"));
    }

    #[test]
    fn all_unknown_costs_sets_the_report_level_flag() {
        let plan = Plan {
            groups: vec![TaskGroup {
                tasks: vec![TaskSpec {
                    task_id: "t1".into(),
                    kind: TaskKind::ImageGenerate,
                    input: String::new(),
                    target_device_id: None,
                    prompt_tokens: None,
                    max_output_tokens: None,
                }],
            }],
        };
        let report = estimate_plan_cost(&plan, &[device("d1", 300.0, 30.0, 0)]);
        assert!(report.has_unknown_costs);
        assert!(report.warning.is_some());
    }
}
