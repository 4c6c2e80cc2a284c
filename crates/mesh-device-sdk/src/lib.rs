//! `mesh-device-sdk` — reusable SDK for building devices that connect to a
//! coordinator (spec §4.11: "devices connect outbound to the coordinator
//! and register reference implementations for the task kinds they support").
//!
//! A "device" is any process that connects to the coordinator over
//! WebSocket, advertises capabilities, and executes dispatched tasks. This
//! crate handles connection management, the hello/welcome handshake,
//! heartbeat, and request multiplexing so a device author only has to
//! implement [`TaskHandler`] for the kinds their device supports.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  Your device (laptop agent / phone app / headless worker) │
//! │                                                           │
//! │   let mut reg = TaskHandlerRegistry::new();                │
//! │   reg.register(TaskKind::Sysinfo, SysinfoHandler);         │
//! │   reg.register(TaskKind::Echo, EchoHandler);                │
//! │                                                           │
//! │   DeviceClientBuilder::new()                               │
//! │       .coordinator_ws_url("ws://coordinator:7300/v1/devices/ws") │
//! │       .device_id("laptop-1")                                │
//! │       .token("secret")                                      │
//! │       .build()?                                             │
//! │       .run(reg, llm_provider, shutdown)                     │
//! │       .await;                                               │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. Connect WS (with `token=<...>&device_id=<...>` query params)
//! 2. Send `device_hello { device_id, capabilities, local_model, ... }`
//! 3. Wait for `coordinator_welcome { session_id, coordinator_version }`
//! 4. Main loop:
//!    - On `run_task`: dispatch to the registered [`TaskHandler`] for the kind, always send `task_result`
//!    - On `run_llm_task`: call the configured `LlmProvider` directly, send `llm_task_result`
//!    - On `read_file`: read locally, base64-encode, send `read_file_result`
//!    - On webrtc/ticket requests: report unsupported (out of scope here)
//!    - On `ping`: reply `pong`; emit periodic `pong` heartbeats of our own
//! 5. On disconnect: reconnect with jittered exponential back-off

pub mod builder;
pub mod client;
pub mod fileread;
pub mod reconnect;
pub mod registry;
pub mod handlers;
pub mod types;

pub use builder::DeviceClientBuilder;
pub use client::DeviceClient;
pub use fileread::read_local_file;
pub use handlers::{EchoHandler, ImageGenerateHandler, LlmGenerateHandler, SysinfoHandler};
pub use reconnect::ReconnectBackoff;
pub use registry::{TaskHandler, TaskHandlerRegistry};
pub use types::{DeviceSdkError, TaskContext};

// Re-export the wire types so devices never need to import mesh-protocol directly.
pub use mesh_protocol::{CoordinatorMessage, DeviceMessage, MAX_MESSAGE_BYTES, PROTOCOL_VERSION};
