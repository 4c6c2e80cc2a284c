//! The device registry (C1): an in-memory catalog keyed by stable device id.
//!
//! Grounded on `gateway/src/nodes/registry.rs`'s `NodeRegistry`: a
//! `RwLock<HashMap>` guarding upsert/list/get, plus a fail-soft probe.
//! Unlike the teacher's registry, there is no allowlist filtering layer —
//! that concept has no counterpart in the spec's device model.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use mesh_domain::device::{Device, DeviceStatus};
use mesh_domain::{Error, Result};

/// In-memory device catalog. Cheap to clone (wraps an `Arc` internally via
/// the caller holding it behind `Arc<Registry>`), but the struct itself owns
/// the lock directly — callers share it via `Arc<Registry>`.
///
/// Each record carries a registration sequence number alongside the
/// `Device` itself, assigned once the first time an id is seen. This is
/// deliberately not a `Device` field: it never goes over the wire, and
/// keeping it out-of-band means ordinary traffic that refreshes
/// `last_seen_ms` (see `touch_last_seen` in `mesh-coordinator`) can never
/// perturb it.
#[derive(Debug, Default)]
pub struct Registry {
    devices: RwLock<HashMap<String, (u64, Device)>>,
    next_seq: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Insert or replace the record for `device.id`. Never fails: validation
    /// of the record is the caller's job (spec §4.1). The registration
    /// sequence number is assigned only the first time an id is seen —
    /// re-registering an existing id updates its `Device` in place without
    /// disturbing its position in `list()`'s ordering.
    pub fn upsert(&self, device: Device) {
        let id = device.id.clone();
        let mut guard = self.devices.write().expect("registry lock poisoned");
        match guard.get_mut(&id) {
            Some((_, existing)) => *existing = device,
            None => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                guard.insert(id, (seq, device));
            }
        }
    }

    /// Snapshot copy of every registered device, in registration order
    /// (ascending by the sequence number assigned in `upsert`). This is the
    /// order the selection engine's tie-breaks rely on (spec §4.2) — it is
    /// fixed at registration time and immune to how recently a device has
    /// talked, unlike `last_seen_ms`, which `prune_stale` uses instead.
    pub fn list(&self) -> Vec<Device> {
        let guard = self.devices.read().expect("registry lock poisoned");
        let mut out: Vec<&(u64, Device)> = guard.values().collect();
        out.sort_by_key(|(seq, _)| *seq);
        out.into_iter().map(|(_, d)| d.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        let guard = self.devices.read().expect("registry lock poisoned");
        guard.get(id).map(|(_, d)| d.clone())
    }

    pub fn len(&self) -> usize {
        self.devices.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail-soft health probe: on timeout or transport failure, returns the
    /// last known state derived from the registry record rather than an
    /// error (spec §4.1: "must not block longer than the caller's
    /// deadline"). Since this crate has no live transport of its own (the
    /// WebSocket connection lives in `mesh-coordinator`), the probe here
    /// degrades directly to the cached record; `mesh-coordinator` is
    /// expected to call `touch_last_seen` after a real ping/pong round trip
    /// and surface fresher `cpu_load`/`mem_used_mb` there.
    pub async fn probe(&self, id: &str, deadline: Duration) -> Result<DeviceStatus> {
        let device = self
            .get(id)
            .ok_or_else(|| Error::not_found(format!("no such device: {id}")))?;
        let status = DeviceStatus {
            last_seen_ms: device.last_seen_ms,
            cpu_load: -1.0,
            mem_used_mb: 0,
            mem_total_mb: device.free_memory_mb,
        };
        // A real probe would race a ping RPC against `deadline`; absent a
        // live channel, honor the contract's intent by never blocking past
        // it even though there is nothing to await here yet.
        let _ = tokio::time::timeout(deadline, async { status.clone() }).await;
        Ok(status)
    }

    /// Remove a device's record. Not part of the spec's C1 contract (the
    /// registry "is never torn down except at shutdown"), but useful for
    /// tests and for `mesh-coordinator` to clean up after a closed
    /// connection it has independently decided to forget.
    pub fn remove(&self, id: &str) -> Option<Device> {
        self.devices
            .write()
            .expect("registry lock poisoned")
            .remove(id)
            .map(|(_, d)| d)
    }

    /// Drop every device not seen for at least `max_age_ms`, returning the
    /// count removed. A periodic safety net for devices whose WebSocket
    /// close never reached `remove` (process kill, network partition).
    pub fn prune_stale(&self, max_age_ms: i64) -> usize {
        let cutoff = mesh_domain::device::now_ms() - max_age_ms;
        let mut guard = self.devices.write().expect("registry lock poisoned");
        let before = guard.len();
        guard.retain(|_, (_, d)| d.last_seen_ms >= cutoff);
        before - guard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_domain::device::{Capabilities, DeviceAddress};

    fn device(id: &str, has_npu: bool, last_seen_ms: i64) -> Device {
        Device {
            id: id.to_string(),
            name: format!("name-{id}"),
            platform: "linux".into(),
            arch: "x86_64".into(),
            address: DeviceAddress {
                primary: format!("ws://{id}:9000"),
                secondary: None,
            },
            capabilities: Capabilities {
                has_cpu: true,
                has_gpu: false,
                has_npu,
                can_screen_capture: false,
                has_local_model: false,
            },
            local_model: None,
            throughput: Default::default(),
            free_memory_mb: 1024,
            last_seen_ms,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let reg = Registry::new();
        reg.upsert(device("d1", false, 1));
        let got = reg.get("d1").expect("present");
        assert_eq!(got.id, "d1");
    }

    #[test]
    fn upsert_replaces_duplicate_id() {
        let reg = Registry::new();
        reg.upsert(device("d1", false, 1));
        reg.upsert(device("d1", true, 2));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("d1").unwrap().capabilities.has_npu);
    }

    #[test]
    fn list_is_a_snapshot_copy() {
        let reg = Registry::new();
        reg.upsert(device("d1", false, 1));
        let snapshot = reg.list();
        reg.upsert(device("d2", false, 2));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn list_orders_by_registration_sequence_not_last_seen() {
        let reg = Registry::new();
        // "b" registers first even though its last_seen_ms is smaller; list()
        // must still return it before "a", which registers second.
        reg.upsert(device("b", false, 10));
        reg.upsert(device("a", false, 20));
        let ids: Vec<_> = reg.list().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn reregistering_does_not_change_list_order() {
        let reg = Registry::new();
        reg.upsert(device("a", false, 1));
        reg.upsert(device("b", false, 2));
        // "a" talks again (e.g. an ordinary task result bumping last_seen_ms)
        // well after "b" registered; its position must not move.
        reg.upsert(device("a", true, 999));
        let ids: Vec<_> = reg.list().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn probe_unknown_device_is_not_found() {
        let reg = Registry::new();
        let err = reg
            .probe("missing", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn probe_known_device_fails_soft_to_cached_status() {
        let reg = Registry::new();
        reg.upsert(device("d1", false, 42));
        let status = reg.probe("d1", Duration::from_millis(50)).await.unwrap();
        assert_eq!(status.last_seen_ms, 42);
    }

    #[test]
    fn remove_drops_the_record() {
        let reg = Registry::new();
        reg.upsert(device("d1", false, 1));
        assert!(reg.remove("d1").is_some());
        assert!(reg.is_empty());
    }

    #[test]
    fn prune_stale_drops_only_old_records() {
        let reg = Registry::new();
        let now = mesh_domain::device::now_ms();
        reg.upsert(device("fresh", false, now));
        reg.upsert(device("stale", false, now - 1_000_000));
        let removed = reg.prune_stale(120_000);
        assert_eq!(removed, 1);
        assert!(reg.get("fresh").is_some());
        assert!(reg.get("stale").is_none());
    }
}
