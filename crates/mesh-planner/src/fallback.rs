//! The deterministic fallback planner (spec §4.5): one `SYSINFO` task per
//! selected device, used whenever the AI path is unavailable or its output
//! fails validation.

use mesh_domain::device::Device;
use mesh_domain::job::{Plan, ReduceKind, ReduceSpec, TaskGroup, TaskKind, TaskSpec};

/// Builds the fallback plan. `max_workers` caps how many devices are
/// selected (0 = all), honoring registration order.
pub fn build(devices: &[Device], max_workers: usize) -> (Plan, ReduceSpec, String) {
    let selected: Vec<&Device> = if max_workers == 0 {
        devices.iter().collect()
    } else {
        devices.iter().take(max_workers).collect()
    };

    let tasks = selected
        .iter()
        .enumerate()
        .map(|(i, d)| TaskSpec {
            task_id: format!("sysinfo-{i}-{}", d.id),
            kind: TaskKind::Sysinfo,
            input: String::new(),
            target_device_id: Some(d.id.clone()),
            prompt_tokens: None,
            max_output_tokens: None,
        })
        .collect();

    let plan = Plan {
        groups: vec![TaskGroup { tasks }],
    };
    let reduce = ReduceSpec {
        kind: ReduceKind::Concat,
    };
    let rationale = if selected.is_empty() {
        "no devices registered; plan has no tasks".to_string()
    } else {
        format!(
            "selected devices: {}",
            selected
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    (plan, reduce, rationale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::device::{Capabilities, DeviceAddress};

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

    #[test]
    fn one_sysinfo_task_per_device_with_unbounded_workers() {
        let devices = vec![device("d1"), device("d2")];
        let (plan, reduce, rationale) = build(&devices, 0);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].tasks.len(), 2);
        assert_eq!(reduce.kind, ReduceKind::Concat);
        assert!(rationale.contains("name-d1"));
        assert!(rationale.contains("name-d2"));
    }

    #[test]
    fn max_workers_caps_device_selection() {
        let devices = vec![device("d1"), device("d2"), device("d3")];
        let (plan, _, _) = build(&devices, 2);
        assert_eq!(plan.groups[0].tasks.len(), 2);
    }

    #[test]
    fn every_task_is_sysinfo() {
        let devices = vec![device("d1")];
        let (plan, _, _) = build(&devices, 0);
        assert!(plan
            .groups
            .iter()
            .flat_map(|g| &g.tasks)
            .all(|t| t.kind == TaskKind::Sysinfo));
    }
}
