//! Core device client — manages the WebSocket lifecycle, heartbeat, and
//! task dispatch via [`TaskHandlerRegistry`].
//!
//! Grounded on `sa-node-sdk::client::NodeClient`: connect, send hello, wait
//! for welcome with a timeout, then a ping task + writer task + reader loop
//! spawning one task per inbound request. The reconnect loop and its
//! "only reset backoff after a completed handshake" rule are carried
//! verbatim; the dispatch switch is rebuilt around `mesh_protocol`'s tagged
//! `CoordinatorMessage` enum instead of a single `ToolRequest` variant.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{FutureExt, SinkExt, StreamExt};
use mesh_domain::device::{Capabilities, LocalModel, Throughput};
use mesh_domain::job::TaskKind;
use mesh_domain::tool::Message as ChatMessage;
use mesh_protocol::{CoordinatorMessage, DeviceMessage, PROTOCOL_VERSION};
use mesh_providers::{ChatRequest, LlmProvider};
use tokio::sync::{mpsc, Semaphore};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use crate::fileread::read_local_file;
use crate::reconnect::ReconnectBackoff;
use crate::registry::TaskHandlerRegistry;
use crate::types::{DeviceSdkError, TaskContext};

/// A fully-configured device client ready to connect to the coordinator.
///
/// Create via [`DeviceClient::builder`].
pub struct DeviceClient {
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

/// RPC-family timeout for waiting on `coordinator_welcome` after `device_hello`.
const WELCOME_TIMEOUT: Duration = Duration::from_secs(10);

impl DeviceClient {
    pub fn builder() -> crate::builder::DeviceClientBuilder {
        crate::builder::DeviceClientBuilder::new()
    }

    /// Run the device client: connect, handshake, enter the message loop.
    /// On disconnection, reconnects per [`ReconnectBackoff`]. An optional
    /// `llm_provider` answers `RunLLMTask` directly so the response can
    /// carry `model_used`/`tokens_generated`; without one, `RunLLMTask`
    /// requests fail with `unavailable`.
    ///
    /// Returns only on fatal error, reconnect exhaustion, or `shutdown`.
    pub async fn run(
        self,
        registry: TaskHandlerRegistry,
        llm_provider: Option<Arc<dyn LlmProvider>>,
        shutdown: CancellationToken,
    ) -> Result<(), DeviceSdkError> {
        let registry = Arc::new(registry);
        let mut attempt: u32 = 0;

        loop {
            if shutdown.is_cancelled() {
                return Err(DeviceSdkError::Shutdown);
            }

            let result = tokio::select! {
                r = self.connect_and_run(&registry, &llm_provider) => r,
                _ = shutdown.cancelled() => {
                    tracing::info!(device_id = %self.device_id, "shutdown requested");
                    return Err(DeviceSdkError::Shutdown);
                }
            };

            match result {
                Ok(handshake_completed) => {
                    tracing::info!(
                        device_id = %self.device_id,
                        handshake_completed,
                        "connection closed gracefully"
                    );
                    if handshake_completed {
                        attempt = 0;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        device_id = %self.device_id,
                        attempt,
                        error = %e,
                        "connection lost"
                    );
                }
            }

            if self.reconnect_backoff.should_give_up(attempt) {
                tracing::error!(
                    device_id = %self.device_id,
                    attempts = attempt,
                    "max reconnect attempts exhausted"
                );
                return Err(DeviceSdkError::ReconnectExhausted(attempt));
            }

            let delay = self.reconnect_backoff.delay_for_attempt(attempt);
            tracing::info!(
                device_id = %self.device_id,
                delay_ms = delay.as_millis() as u64,
                attempt = attempt + 1,
                "reconnecting"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.cancelled() => return Err(DeviceSdkError::Shutdown),
            }

            attempt += 1;
        }
    }

    /// Same as [`run`](Self::run), but returns a `JoinHandle` for embedding
    /// in another runtime.
    pub fn spawn(
        self,
        registry: TaskHandlerRegistry,
        llm_provider: Option<Arc<dyn LlmProvider>>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<(), DeviceSdkError>> {
        tokio::spawn(async move { self.run(registry, llm_provider, shutdown).await })
    }

    /// Single connection lifecycle: connect -> handshake -> message loop.
    /// Returns `Ok(true)` if `coordinator_welcome` arrived before the
    /// connection closed, `Ok(false)` otherwise.
    async fn connect_and_run(
        &self,
        registry: &Arc<TaskHandlerRegistry>,
        llm_provider: &Option<Arc<dyn LlmProvider>>,
    ) -> Result<bool, anyhow::Error> {
        let url = self.build_url();
        tracing::info!(url = %url, device_id = %self.device_id, "connecting to coordinator");

        let (ws, _response) = tokio_tungstenite::connect_async(&url).await?;
        let (mut sink, mut stream) = ws.split();

        let hello = DeviceMessage::Hello {
            device_id: self.device_id.clone(),
            name: self.name.clone(),
            platform: self.platform.clone(),
            arch: self.arch.clone(),
            capabilities: self.capabilities,
            local_model: self.local_model.clone(),
            throughput: self.throughput,
            free_memory_mb: self.free_memory_mb,
            version: self.version.clone(),
        };
        let json = serde_json::to_string(&hello)?;
        sink.send(WsMessage::Text(json)).await?;

        let welcome = tokio::time::timeout(WELCOME_TIMEOUT, async {
            while let Some(Ok(msg)) = stream.next().await {
                if let WsMessage::Text(text) = msg {
                    if let Ok(CoordinatorMessage::Welcome {
                        coordinator_version,
                        ..
                    }) = serde_json::from_str(&text)
                    {
                        return Ok(coordinator_version);
                    }
                }
            }
            Err(anyhow::anyhow!("connection closed before welcome"))
        })
        .await;

        let coordinator_version = match welcome {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("coordinator_welcome timeout")),
        };

        tracing::info!(
            coordinator_version = %coordinator_version,
            device_id = %self.device_id,
            protocol_version = PROTOCOL_VERSION,
            "coordinator welcomed us"
        );

        let ws = sink
            .reunite(stream)
            .map_err(|e| anyhow::anyhow!("failed to reunite websocket halves: {e}"))?;
        let (mut sink, mut stream) = ws.split();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<DeviceMessage>(64);
        let task_semaphore = Arc::new(Semaphore::new(self.max_concurrent_tasks));
        let inflight_cancel = CancellationToken::new();

        let ping_tx = outbound_tx.clone();
        let ping_interval = self.heartbeat_interval;
        let ping_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(ping_interval);
            loop {
                interval.tick().await;
                let msg = DeviceMessage::Pong {
                    timestamp_ms: Utc::now().timestamp_millis(),
                };
                if ping_tx.send(msg).await.is_err() {
                    break;
                }
            }
        });

        let writer_task = tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&msg) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to serialize outbound message");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        let max_bytes = self.max_message_bytes;
        while let Some(Ok(msg)) = stream.next().await {
            match msg {
                WsMessage::Text(ref text) => {
                    if text.len() > max_bytes {
                        tracing::warn!(
                            bytes = text.len(),
                            max = max_bytes,
                            "inbound message exceeds max_message_bytes, dropping"
                        );
                        continue;
                    }

                    match serde_json::from_str::<CoordinatorMessage>(text) {
                        Ok(CoordinatorMessage::RunTask {
                            request_id,
                            task_id,
                            job_id,
                            kind,
                            input,
                        }) => {
                            spawn_run_task(
                                registry.clone(),
                                outbound_tx.clone(),
                                task_semaphore.clone(),
                                inflight_cancel.child_token(),
                                request_id,
                                task_id,
                                job_id,
                                kind,
                                input,
                            );
                        }
                        Ok(CoordinatorMessage::RunLlmTask {
                            request_id,
                            prompt,
                            model,
                            max_tokens,
                        }) => {
                            spawn_run_llm_task(
                                llm_provider.clone(),
                                outbound_tx.clone(),
                                task_semaphore.clone(),
                                request_id,
                                prompt,
                                model,
                                max_tokens,
                            );
                        }
                        Ok(CoordinatorMessage::ReadFile { request_id, request }) => {
                            let tx = outbound_tx.clone();
                            tokio::spawn(async move {
                                let response = tokio::task::spawn_blocking(move || read_local_file(&request))
                                    .await
                                    .unwrap_or_else(|e| mesh_domain::file::ReadFileResponse {
                                        error: Some(format!("read panicked: {e}")),
                                        ..Default::default()
                                    });
                                let _ = tx
                                    .send(DeviceMessage::ReadFileResult { request_id, response })
                                    .await;
                            });
                        }
                        Ok(CoordinatorMessage::StartWebRtc { request_id, .. })
                        | Ok(CoordinatorMessage::CompleteWebRtc { request_id, .. })
                        | Ok(CoordinatorMessage::StopWebRtc { request_id, .. }) => {
                            // Media/signaling pipeline is out of scope; this
                            // SDK only forwards the RPC envelope.
                            let _ = outbound_tx
                                .send(DeviceMessage::WebRtcResult {
                                    request_id,
                                    payload: serde_json::Value::Null,
                                    error: Some("webrtc signaling is not implemented by this device".into()),
                                })
                                .await;
                        }
                        Ok(CoordinatorMessage::CreateDownloadTicket { request_id, .. }) => {
                            let _ = outbound_tx
                                .send(DeviceMessage::TicketResult {
                                    request_id,
                                    token: None,
                                    filename: None,
                                    size_bytes: 0,
                                    expires_unix_ms: 0,
                                    error: Some("bulk download tickets are not implemented by this device".into()),
                                })
                                .await;
                        }
                        Ok(CoordinatorMessage::Ping { timestamp_ms }) => {
                            let _ = outbound_tx.send(DeviceMessage::Pong { timestamp_ms }).await;
                        }
                        Ok(CoordinatorMessage::ExecCmd {
                            request_id,
                            command,
                            timeout_ms,
                            working_dir,
                        }) => {
                            spawn_exec_cmd(
                                outbound_tx.clone(),
                                task_semaphore.clone(),
                                request_id,
                                command,
                                timeout_ms,
                                working_dir,
                            );
                        }
                        Ok(CoordinatorMessage::Welcome { .. }) => {
                            tracing::debug!("ignoring duplicate coordinator_welcome");
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "failed to parse coordinator message");
                        }
                    }
                }
                WsMessage::Close(_) => {
                    tracing::info!("coordinator closed connection");
                    break;
                }
                _ => {}
            }
        }

        inflight_cancel.cancel();
        ping_task.abort();
        writer_task.abort();

        Ok(true)
    }

    fn build_url(&self) -> String {
        let base = &self.coordinator_ws_url;
        let sep = if base.contains('?') { "&" } else { "?" };
        match &self.token {
            Some(token) => format!("{base}{sep}token={token}&device_id={}", self.device_id),
            None => format!("{base}{sep}device_id={}", self.device_id),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn spawn_run_task(
    registry: Arc<TaskHandlerRegistry>,
    outbound_tx: mpsc::Sender<DeviceMessage>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    request_id: String,
    task_id: String,
    job_id: String,
    kind: TaskKind,
    input: String,
) {
    tokio::spawn(async move {
        let _permit = semaphore.acquire().await;
        let started = std::time::Instant::now();

        let ctx = TaskContext {
            request_id: request_id.clone(),
            task_id,
            job_id,
            cancel,
        };

        let response = match registry.get(kind) {
            Some(handler) => {
                let call_result = AssertUnwindSafe(handler.call(ctx, input)).catch_unwind().await;
                match call_result {
                    Ok(Ok(output)) => DeviceMessage::TaskResult {
                        request_id,
                        ok: true,
                        output,
                        error: String::new(),
                        time_ms: started.elapsed().as_millis() as u64,
                    },
                    Ok(Err(e)) => DeviceMessage::TaskResult {
                        request_id,
                        ok: false,
                        output: String::new(),
                        error: e.message,
                        time_ms: started.elapsed().as_millis() as u64,
                    },
                    Err(_panic) => {
                        tracing::error!(kind = ?kind, request_id = %request_id, "task handler panicked");
                        DeviceMessage::TaskResult {
                            request_id,
                            ok: false,
                            output: String::new(),
                            error: "task handler panicked".into(),
                            time_ms: started.elapsed().as_millis() as u64,
                        }
                    }
                }
            }
            None => DeviceMessage::TaskResult {
                request_id,
                ok: false,
                output: String::new(),
                error: format!("no handler registered for {kind:?}"),
                time_ms: started.elapsed().as_millis() as u64,
            },
        };

        let _ = outbound_tx.send(response).await;
    });
}

fn spawn_run_llm_task(
    provider: Option<Arc<dyn LlmProvider>>,
    outbound_tx: mpsc::Sender<DeviceMessage>,
    semaphore: Arc<Semaphore>,
    request_id: String,
    prompt: String,
    model: Option<String>,
    max_tokens: Option<u32>,
) {
    tokio::spawn(async move {
        let _permit = semaphore.acquire().await;

        let Some(provider) = provider else {
            let _ = outbound_tx
                .send(DeviceMessage::LlmTaskResult {
                    request_id,
                    output: String::new(),
                    model_used: String::new(),
                    tokens_generated: 0,
                    error: Some("no LLM provider is configured on this device".into()),
                })
                .await;
            return;
        };

        let request = ChatRequest {
            messages: vec![ChatMessage::user(prompt)],
            tools: vec![],
            temperature: 0.2,
            max_tokens: max_tokens.unwrap_or(1024),
            json_mode: false,
            model: model.unwrap_or_default(),
        };

        let response = match provider.chat(request).await {
            Ok(r) => DeviceMessage::LlmTaskResult {
                request_id,
                output: r.content,
                model_used: r.model,
                tokens_generated: r.usage.output_tokens,
                error: None,
            },
            Err(e) => DeviceMessage::LlmTaskResult {
                request_id,
                output: String::new(),
                model_used: String::new(),
                tokens_generated: 0,
                error: Some(e.message),
            },
        };

        let _ = outbound_tx.send(response).await;
    });
}

/// Runs `command` under `sh -c`, bounded by `timeout_ms`, and reports the
/// combined stdout/stderr as `output` on success or `error` on a non-zero
/// exit, timeout, or spawn failure. Denylisting happens upstream in
/// `mesh-tools::executor`; this device trusts whatever the coordinator sends.
fn spawn_exec_cmd(
    outbound_tx: mpsc::Sender<DeviceMessage>,
    semaphore: Arc<Semaphore>,
    request_id: String,
    command: String,
    timeout_ms: u64,
    working_dir: Option<String>,
) {
    tokio::spawn(async move {
        let _permit = semaphore.acquire().await;
        let started = std::time::Instant::now();

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&command);
        if let Some(dir) = &working_dir {
            cmd.current_dir(dir);
        }

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), cmd.output()).await;
        let time_ms = started.elapsed().as_millis() as u64;

        let message = match result {
            Ok(Ok(output)) if output.status.success() => DeviceMessage::ExecResult {
                request_id,
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
                error: String::new(),
                time_ms,
            },
            Ok(Ok(output)) => DeviceMessage::ExecResult {
                request_id,
                output: String::from_utf8_lossy(&output.stdout).into_owned(),
                error: String::from_utf8_lossy(&output.stderr).into_owned(),
                time_ms,
            },
            Ok(Err(e)) => DeviceMessage::ExecResult {
                request_id,
                output: String::new(),
                error: format!("failed to spawn command: {e}"),
                time_ms,
            },
            Err(_) => DeviceMessage::ExecResult {
                request_id,
                output: String::new(),
                error: format!("command timed out after {timeout_ms}ms"),
                time_ms,
            },
        };

        let _ = outbound_tx.send(message).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> DeviceClient {
        DeviceClient {
            coordinator_ws_url: "ws://localhost:7300/v1/devices/ws".into(),
            token: Some("secret".into()),
            device_id: "test-device".into(),
            name: "Test Device".into(),
            platform: "linux".into(),
            arch: "x86_64".into(),
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

    #[test]
    fn build_url_with_token() {
        let client = test_client();
        assert_eq!(
            client.build_url(),
            "ws://localhost:7300/v1/devices/ws?token=secret&device_id=test-device"
        );
    }

    #[test]
    fn build_url_without_token() {
        let mut client = test_client();
        client.token = None;
        assert_eq!(
            client.build_url(),
            "ws://localhost:7300/v1/devices/ws?device_id=test-device"
        );
    }

    #[test]
    fn build_url_with_existing_query_params() {
        let mut client = test_client();
        client.coordinator_ws_url = "ws://localhost:7300/v1/devices/ws?foo=bar".into();
        assert!(client
            .build_url()
            .starts_with("ws://localhost:7300/v1/devices/ws?foo=bar&token=secret"));
    }
}
