//! Per-device request/response correlation for remote execution handoff
//! (spec §4.2 "Remote execution handoff", §9 "Remote channels").
//!
//! Grounded on `gateway/src/nodes/router.rs`'s `ToolRouter`: a bounded
//! `oneshot`-per-request pending map, keyed by `request_id`, with per-device
//! and global caps so one slow device cannot starve the others. The actual
//! WebSocket send lives in `mesh-coordinator` (it owns the socket); this
//! type only tracks in-flight requests and wakes the waiter when a
//! `mesh-protocol::DeviceMessage` response arrives.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use mesh_domain::{Error, Result};
use tokio::sync::oneshot;

const MAX_PENDING_PER_DEVICE: usize = 50;
const MAX_PENDING_GLOBAL: usize = 200;

struct Pending {
    device_id: String,
    tx: oneshot::Sender<serde_json::Value>,
}

/// Tracks in-flight request/response pairs across every connected device.
#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<String, Pending>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new in-flight request for `device_id`, returning the
    /// receiver half the caller awaits (with a timeout). Fails with
    /// `unavailable` if either the per-device or the global cap is hit,
    /// mirroring the teacher's bounded-pending guard.
    pub fn register(
        &self,
        request_id: String,
        device_id: &str,
    ) -> Result<oneshot::Receiver<serde_json::Value>> {
        let mut entries = self.entries.lock().expect("pending lock poisoned");
        if entries.len() >= MAX_PENDING_GLOBAL {
            return Err(Error::unavailable("too many in-flight requests globally"));
        }
        let per_device = entries
            .values()
            .filter(|p| p.device_id == device_id)
            .count();
        if per_device >= MAX_PENDING_PER_DEVICE {
            return Err(Error::unavailable(format!(
                "too many in-flight requests for device {device_id}"
            )));
        }
        let (tx, rx) = oneshot::channel();
        entries.insert(
            request_id,
            Pending {
                device_id: device_id.to_string(),
                tx,
            },
        );
        Ok(rx)
    }

    /// Wake the waiter for `request_id` with `payload`. No-op if the
    /// request is unknown (already timed out, or a duplicate/late reply).
    pub fn complete(&self, request_id: &str, payload: serde_json::Value) {
        let pending = self
            .entries
            .lock()
            .expect("pending lock poisoned")
            .remove(request_id);
        if let Some(p) = pending {
            let _ = p.tx.send(payload);
        }
    }

    /// Fail every pending request for a device whose connection just
    /// dropped, so waiters don't hang until their deadline.
    pub fn fail_all_for_device(&self, device_id: &str) {
        let mut entries = self.entries.lock().expect("pending lock poisoned");
        let ids: Vec<String> = entries
            .iter()
            .filter(|(_, p)| p.device_id == device_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            entries.remove(&id);
            // Dropping the sender causes the receiver to resolve to an
            // error; the caller's `await` on `rx` observes a `RecvError`.
        }
    }

    pub fn pending_count(&self) -> usize {
        self.entries.lock().expect("pending lock poisoned").len()
    }

    /// Await a response with a deadline, mapping a timeout or a dropped
    /// sender to `unavailable` (spec §7: downstream RPC failure propagates
    /// as `unavailable` at the task level, not `deadline_exceeded` —
    /// `deadline_exceeded` is reserved for the caller's own deadline).
    pub async fn wait(
        rx: oneshot::Receiver<serde_json::Value>,
        deadline: Duration,
    ) -> Result<serde_json::Value> {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(Error::unavailable("device connection closed before responding")),
            Err(_) => Err(Error::deadline_exceeded("timed out waiting for device response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_wakes_the_waiter() {
        let pending = PendingRequests::new();
        let rx = pending.register("r1".into(), "d1").unwrap();
        pending.complete("r1", serde_json::json!({"ok": true}));
        let value = PendingRequests::wait(rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn wait_times_out_when_nothing_completes() {
        let pending = PendingRequests::new();
        let rx = pending.register("r1".into(), "d1").unwrap();
        let err = PendingRequests::wait(rx, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn fail_all_for_device_drains_only_that_device() {
        let pending = PendingRequests::new();
        let rx1 = pending.register("r1".into(), "d1").unwrap();
        let _rx2 = pending.register("r2".into(), "d2").unwrap();
        pending.fail_all_for_device("d1");
        assert_eq!(pending.pending_count(), 1);
        let err = PendingRequests::wait(rx1, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::Unavailable);
    }

    #[test]
    fn register_enforces_per_device_cap() {
        let pending = PendingRequests::new();
        for i in 0..MAX_PENDING_PER_DEVICE {
            pending.register(format!("r{i}"), "d1").unwrap();
        }
        let err = pending.register("overflow".into(), "d1").unwrap_err();
        assert_eq!(err.kind, mesh_domain::ErrorKind::Unavailable);
    }
}
