//! The `Device` data model (spec §3) and its capability/throughput fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reachability addresses for a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceAddress {
    /// Primary RPC endpoint (the meshd-protocol WebSocket URL).
    pub primary: String,
    /// Optional secondary bulk-HTTP endpoint (file tickets, etc.).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
}

/// Capability flags. Monotonic over a session: a device cannot lose a
/// capability without re-registering (spec §3 invariant).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capabilities {
    pub has_cpu: bool,
    pub has_gpu: bool,
    pub has_npu: bool,
    pub can_screen_capture: bool,
    pub has_local_model: bool,
}

/// Descriptor for a locally hosted LLM, present only when
/// `capabilities.has_local_model` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalModel {
    pub endpoint: String,
    pub model_name: String,
}

/// Advertised tokens-per-second for prompt ingestion (prefill) and token
/// generation (decode). Either may be zero, meaning "unknown".
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Throughput {
    pub prefill_tps: f64,
    pub decode_tps: f64,
}

/// A device in the registry (spec §3).
///
/// Identity (`id`) is a stable opaque id generated once per host and
/// persisted outside the core (out of scope here — the core only requires
/// that it be unique and immutable once registered).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub platform: String,
    pub arch: String,
    pub address: DeviceAddress,
    pub capabilities: Capabilities,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_model: Option<LocalModel>,
    #[serde(default)]
    pub throughput: Throughput,
    /// Free memory in MB. Zero means unknown.
    #[serde(default)]
    pub free_memory_mb: u64,
    /// Monotonic wall-clock last-seen timestamp, in milliseconds.
    pub last_seen_ms: i64,
}

impl Device {
    /// Validates the `has_local_model ⇒ local_chat_endpoint ≠ ""` invariant.
    /// Callers (registry `Upsert`) are expected to reject devices that fail
    /// this, though the registry contract itself never fails (spec §4.1) —
    /// validation is the caller's job, so this is exposed as a predicate
    /// rather than a fallible constructor.
    pub fn is_well_formed(&self) -> bool {
        if self.capabilities.has_local_model {
            return self
                .local_model
                .as_ref()
                .is_some_and(|m| !m.endpoint.is_empty());
        }
        true
    }
}

/// Health-probe result returned by `Registry::probe` (spec §4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub last_seen_ms: i64,
    /// CPU load in [0,1], or -1 if unknown.
    pub cpu_load: f64,
    pub mem_used_mb: u64,
    pub mem_total_mb: u64,
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
