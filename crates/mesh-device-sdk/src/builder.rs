//! Builder pattern for constructing a [`DeviceClient`].

use std::time::Duration;

use mesh_domain::device::{Capabilities, LocalModel, Throughput};

use crate::client::DeviceClient;
use crate::reconnect::ReconnectBackoff;
use crate::types::DeviceSdkError;

/// Fluent builder for [`DeviceClient`].
///
/// ```rust,no_run
/// # use mesh_device_sdk::DeviceClientBuilder;
/// # use mesh_domain::device::Capabilities;
/// let client = DeviceClientBuilder::new()
///     .coordinator_ws_url("ws://localhost:7300/v1/devices/ws")
///     .device_id("laptop-1")
///     .name("Stephane's MacBook Pro")
///     .platform("macos")
///     .arch("aarch64")
///     .capabilities(Capabilities { has_cpu: true, ..Default::default() })
///     .version(env!("CARGO_PKG_VERSION"))
///     .build()
///     .unwrap();
/// ```
pub struct DeviceClientBuilder {
    pub(crate) coordinator_ws_url: String,
    pub(crate) token: Option<String>,
    pub(crate) device_id: String,
    pub(crate) name: String,
    pub(crate) platform: String,
    pub(crate) arch: String,
    pub(crate) capabilities: Capabilities,
    pub(crate) local_model: Option<LocalModel>,
    pub(crate) throughput: Throughput,
    pub(crate) free_memory_mb: u64,
    pub(crate) version: String,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) max_concurrent_tasks: usize,
    pub(crate) max_message_bytes: usize,
}

impl DeviceClientBuilder {
    pub fn new() -> Self {
        Self {
            coordinator_ws_url: "ws://localhost:7300/v1/devices/ws".into(),
            token: None,
            device_id: "unnamed-device".into(),
            name: "unnamed-device".into(),
            platform: std::env::consts::OS.into(),
            arch: std::env::consts::ARCH.into(),
            capabilities: Capabilities::default(),
            local_model: None,
            throughput: Throughput::default(),
            free_memory_mb: 0,
            version: "0.1.0".into(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_backoff: ReconnectBackoff::default(),
            max_concurrent_tasks: 16,
            max_message_bytes: mesh_protocol::MAX_MESSAGE_BYTES,
        }
    }

    // ── Required ─────────────────────────────────────────────────────

    pub fn coordinator_ws_url(mut self, url: impl Into<String>) -> Self {
        self.coordinator_ws_url = url.into();
        self
    }

    /// Set the bearer token used to authenticate the device.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    // ── Identity / capabilities ──────────────────────────────────────

    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device_id = id.into();
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Set the local model descriptor; implies `capabilities.has_local_model`.
    pub fn local_model(mut self, endpoint: impl Into<String>, model_name: impl Into<String>) -> Self {
        self.capabilities.has_local_model = true;
        self.local_model = Some(LocalModel {
            endpoint: endpoint.into(),
            model_name: model_name.into(),
        });
        self
    }

    pub fn throughput(mut self, prefill_tps: f64, decode_tps: f64) -> Self {
        self.throughput = Throughput { prefill_tps, decode_tps };
        self
    }

    pub fn free_memory_mb(mut self, mb: u64) -> Self {
        self.free_memory_mb = mb;
        self
    }

    pub fn version(mut self, v: impl Into<String>) -> Self {
        self.version = v.into();
        self
    }

    // ── Behavior ─────────────────────────────────────────────────────

    /// Override the heartbeat interval (default 30s).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Maximum concurrent task executions (default 16).
    pub fn max_concurrent_tasks(mut self, n: usize) -> Self {
        self.max_concurrent_tasks = n;
        self
    }

    /// Maximum framed message size, matching `mesh_protocol::MAX_MESSAGE_BYTES`
    /// by default.
    pub fn max_message_bytes(mut self, n: usize) -> Self {
        self.max_message_bytes = n;
        self
    }

    pub fn build(self) -> Result<DeviceClient, DeviceSdkError> {
        if self.coordinator_ws_url.is_empty() {
            return Err(DeviceSdkError::Config("coordinator_ws_url is required".into()));
        }
        if self.device_id.is_empty() {
            return Err(DeviceSdkError::Config("device_id is required".into()));
        }
        if !self.capabilities.has_local_model && self.local_model.is_some() {
            return Err(DeviceSdkError::Config(
                "local_model set without capabilities.has_local_model".into(),
            ));
        }

        Ok(DeviceClient {
            coordinator_ws_url: self.coordinator_ws_url,
            token: self.token,
            device_id: self.device_id,
            name: self.name,
            platform: self.platform,
            arch: self.arch,
            capabilities: self.capabilities,
            local_model: self.local_model,
            throughput: self.throughput,
            free_memory_mb: self.free_memory_mb,
            version: self.version,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_backoff: self.reconnect_backoff,
            max_concurrent_tasks: self.max_concurrent_tasks,
            max_message_bytes: self.max_message_bytes,
        })
    }
}

impl Default for DeviceClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_rejects_an_empty_device_id() {
        let err = DeviceClientBuilder::new().device_id("").build().unwrap_err();
        assert!(matches!(err, DeviceSdkError::Config(_)));
    }

    #[test]
    fn build_rejects_a_local_model_without_the_capability_flag() {
        let mut builder = DeviceClientBuilder::new().device_id("d1");
        builder.local_model = Some(LocalModel {
            endpoint: "http://localhost:8080".into(),
            model_name: "llama".into(),
        });
        assert!(builder.build().is_err());
    }

    #[test]
    fn local_model_helper_sets_the_capability_flag() {
        let builder = DeviceClientBuilder::new()
            .device_id("d1")
            .local_model("http://localhost:8080", "llama");
        let client = builder.build().unwrap();
        assert!(client.capabilities.has_local_model);
        assert_eq!(client.local_model.unwrap().model_name, "llama");
    }

    #[test]
    fn defaults_are_usable() {
        let client = DeviceClientBuilder::new().device_id("d1").build().unwrap();
        assert_eq!(client.max_message_bytes, mesh_protocol::MAX_MESSAGE_BYTES);
    }
}
