//! The routing/selection engine (C2): a pure function of (policy, registry
//! snapshot, coordinator's own id).
//!
//! Grounded on `gateway/src/nodes/router.rs`'s `resolve` — longest-match and
//! deterministic tie-break over a snapshot — generalized here from
//! capability-prefix routing to the six policy modes in spec §3/§4.2. Ties
//! are broken by registration order, which `Registry::list` already returns
//! (sorted by registration sequence number, see `registry.rs`).

use mesh_domain::device::Device;
use mesh_domain::routing::{RoutingPolicy, Selection};
use mesh_domain::{Error, Result};

/// Select a single device from `devices` (already in registration order)
/// per `policy`. `self_id` identifies the coordinator's own device record,
/// if it has one, for `PREFER_REMOTE`'s locality check.
///
/// Never touches the network; O(N) over the snapshot (spec §4.2).
pub fn select(policy: &RoutingPolicy, devices: &[Device], self_id: &str) -> Result<Selection> {
    match policy {
        RoutingPolicy::BestAvailable => best_available(devices, self_id).ok_or_else(|| {
            Error::failed_precondition("no devices available for BEST_AVAILABLE selection")
        }),
        RoutingPolicy::RequireNpu => devices
            .iter()
            .find(|d| d.capabilities.has_npu)
            .map(|d| to_selection(d, d.id == self_id))
            .ok_or_else(|| Error::failed_precondition("no device with an NPU is registered")),
        RoutingPolicy::PreferRemote => {
            if let Some(d) = devices.iter().find(|d| d.id != self_id) {
                Ok(to_selection(d, false))
            } else {
                devices
                    .iter()
                    .find(|d| d.id == self_id)
                    .map(|d| to_selection(d, true))
                    .ok_or_else(|| {
                        Error::failed_precondition(
                            "no remote device available and self is not registered",
                        )
                    })
            }
        }
        RoutingPolicy::ForceDeviceId { device_id } => devices
            .iter()
            .find(|d| &d.id == device_id)
            .map(|d| to_selection(d, d.id == self_id))
            .ok_or_else(|| Error::not_found(format!("no device with id {device_id}"))),
        RoutingPolicy::PreferLocalModel => devices
            .iter()
            .find(|d| d.capabilities.has_local_model)
            .map(|d| to_selection(d, d.id == self_id))
            .or_else(|| best_available(devices, self_id))
            .ok_or_else(|| {
                Error::failed_precondition("no devices available for PREFER_LOCAL_MODEL selection")
            }),
        RoutingPolicy::RequireLocalModel => devices
            .iter()
            .find(|d| d.capabilities.has_local_model)
            .map(|d| to_selection(d, d.id == self_id))
            .ok_or_else(|| {
                Error::failed_precondition("no device with a local model is registered")
            }),
    }
}

/// First device with an NPU; else first with a GPU; else the first device
/// at all (spec §4.2).
fn best_available(devices: &[Device], self_id: &str) -> Option<Selection> {
    devices
        .iter()
        .find(|d| d.capabilities.has_npu)
        .or_else(|| devices.iter().find(|d| d.capabilities.has_gpu))
        .or_else(|| devices.first())
        .map(|d| to_selection(d, d.id == self_id))
}

fn to_selection(device: &Device, executed_locally: bool) -> Selection {
    Selection {
        device_id: device.id.clone(),
        device_name: device.name.clone(),
        device_address: device.address.primary.clone(),
        executed_locally,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::device::{Capabilities, DeviceAddress};

    fn device(id: &str, caps: Capabilities) -> Device {
        Device {
            id: id.to_string(),
            name: format!("name-{id}"),
            platform: "linux".into(),
            arch: "x86_64".into(),
            address: DeviceAddress {
                primary: format!("ws://{id}:9000"),
                secondary: None,
            },
            capabilities: caps,
            local_model: None,
            throughput: Default::default(),
            free_memory_mb: 0,
            last_seen_ms: 0,
        }
    }

    fn cpu_only() -> Capabilities {
        Capabilities {
            has_cpu: true,
            ..Default::default()
        }
    }

    #[test]
    fn selection_is_a_pure_function() {
        let devices = vec![device("d1", cpu_only())];
        let a = select(&RoutingPolicy::BestAvailable, &devices, "self").unwrap();
        let b = select(&RoutingPolicy::BestAvailable, &devices, "self").unwrap();
        assert_eq!(a.device_id, b.device_id);
    }

    #[test]
    fn best_available_prefers_npu_then_gpu_then_any() {
        let devices = vec![
            device("cpu-dev", cpu_only()),
            device(
                "gpu-dev",
                Capabilities {
                    has_gpu: true,
                    ..Default::default()
                },
            ),
            device(
                "npu-dev",
                Capabilities {
                    has_npu: true,
                    ..Default::default()
                },
            ),
        ];
        let sel = select(&RoutingPolicy::BestAvailable, &devices, "self").unwrap();
        assert_eq!(sel.device_id, "npu-dev");
    }

    #[test]
    fn require_npu_fails_precondition_when_absent() {
        let devices = vec![device("d1", cpu_only())];
        let err = select(&RoutingPolicy::RequireNpu, &devices, "self").unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::FailedPrecondition);
    }

    #[test]
    fn force_device_id_returns_not_found_when_absent() {
        let devices = vec![device("d1", cpu_only())];
        let err = select(
            &RoutingPolicy::ForceDeviceId {
                device_id: "ghost".into(),
            },
            &devices,
            "self",
        )
        .unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::NotFound);
    }

    #[test]
    fn prefer_remote_on_self_only_snapshot_flags_executed_locally() {
        let devices = vec![device("self", cpu_only())];
        let sel = select(&RoutingPolicy::PreferRemote, &devices, "self").unwrap();
        assert_eq!(sel.device_id, "self");
        assert!(sel.executed_locally);
    }

    #[test]
    fn prefer_remote_picks_first_non_self_device() {
        let devices = vec![device("self", cpu_only()), device("d2", cpu_only())];
        let sel = select(&RoutingPolicy::PreferRemote, &devices, "self").unwrap();
        assert_eq!(sel.device_id, "d2");
        assert!(!sel.executed_locally);
    }

    #[test]
    fn require_local_model_fails_when_absent() {
        let devices = vec![device("d1", cpu_only())];
        let err = select(&RoutingPolicy::RequireLocalModel, &devices, "self").unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::FailedPrecondition);
    }

    #[test]
    fn prefer_local_model_falls_back_to_best_available() {
        let devices = vec![device("d1", cpu_only())];
        let sel = select(&RoutingPolicy::PreferLocalModel, &devices, "self").unwrap();
        assert_eq!(sel.device_id, "d1");
    }
}
