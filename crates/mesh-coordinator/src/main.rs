//! `meshctl` — the coordinator binary (spec §1/§6): hosts the device
//! WebSocket, the job engine, the planner/cost bridge, the agent loop, and
//! the JSON gateway that fronts all of it.
//!
//! Bootstrap order and logging style are grounded on `gateway/src/main.rs`'s
//! `run_server`: every service is built behind an `Arc`, each followed by a
//! `tracing::info!` line under its own `// ── Section ──` heading.

mod api;
mod auth;
mod cli;
mod error;
mod offline_provider;
mod state;
mod summarizer;
mod transport;
mod ws;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mesh_domain::config::{Config, ConfigSeverity, ProviderKind};
use mesh_domain::device::{now_ms, Capabilities, Device, DeviceAddress, Throughput};
use mesh_jobs::JobEngine;
use mesh_providers::{LlmProvider, OpenAiCompatProvider};
use mesh_registry::{PendingRequests, Registry};
use mesh_sessions::SessionStore;
use mesh_tools::ToolExecutor;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, ConfigCommand};
use offline_provider::OfflineProvider;
use state::AppState;
use transport::{CoordinatorDispatcher, CoordinatorRoutedBackend, DeviceTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = Config::from_env();
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = Config::from_env();
            if !cli::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = Config::from_env();
            cli::show(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mesh_coordinator=debug"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if std::env::var("MESH_LOG_JSON").is_ok() {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("meshctl starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Device registry ──────────────────────────────────────────────
    let registry = Arc::new(Registry::new());
    tracing::info!("device registry ready");

    // ── Pending-request correlation table ────────────────────────────
    let pending = Arc::new(PendingRequests::new());
    tracing::info!("pending-request table ready");

    // ── Self-registration (spec §4.2: coordinator is itself a device) ──
    let self_id = config
        .server
        .device_id_override
        .clone()
        .unwrap_or_else(|| "coordinator".to_string());
    registry.upsert(Device {
        id: self_id.clone(),
        name: "coordinator".to_string(),
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        address: DeviceAddress {
            primary: format!("http://{}", config.server.gateway_bind_addr),
            secondary: None,
        },
        capabilities: Capabilities {
            has_cpu: true,
            has_gpu: false,
            has_npu: false,
            can_screen_capture: false,
            has_local_model: false,
        },
        local_model: None,
        throughput: Throughput::default(),
        free_memory_mb: 0,
        last_seen_ms: now_ms(),
    });
    tracing::info!(device_id = %self_id, "coordinator self-registered as a device");

    // ── Device transport (device WS sinks + selection) ───────────────
    let transport = Arc::new(DeviceTransport::new(registry.clone(), pending.clone(), self_id.clone()));
    tracing::info!("device transport ready");

    // ── Session store ─────────────────────────────────────────────────
    let sessions = Arc::new(SessionStore::new(config.auth.shared_session_key.clone()));
    tracing::info!("session store ready");

    // ── LLM provider ──────────────────────────────────────────────────
    let llm: Arc<dyn LlmProvider> = match config.llm.provider {
        ProviderKind::OpenaiCompat => {
            tracing::info!(base_url = %config.llm.base_url, model = %config.llm.model_name, "chat model provider: openai-compatible HTTP");
            Arc::new(OpenAiCompatProvider::new(
                config.llm.base_url.clone(),
                config.llm.api_key.clone(),
                Duration::from_secs(config.llm.timeout_secs),
            ))
        }
        ProviderKind::Scripted => {
            tracing::warn!("chat model provider: offline (MESH_LLM_PROVIDER=scripted) — no real model is called");
            Arc::new(OfflineProvider)
        }
    };

    // ── Job engine (C4) ───────────────────────────────────────────────
    let dispatcher = Arc::new(CoordinatorDispatcher::new(transport.clone()));
    let jobs = Arc::new(JobEngine::new(registry.clone(), dispatcher));
    tracing::info!("job engine ready");

    // ── Tool executor + routed backend (C9 / C1-C2-C7 bridge) ────────
    let routed_backend = Arc::new(CoordinatorRoutedBackend::new(transport.clone()));
    let tool_executor = Arc::new(ToolExecutor::new(routed_backend.clone()));
    tracing::info!("tool executor ready");

    // ── Chat memory (C10) ─────────────────────────────────────────────
    let chat_memory = Arc::new(RwLock::new(HashMap::new()));
    tracing::info!("chat memory map ready");

    // ── API token (read once, hash for constant-time comparison) ────
    let api_token_hash = match std::env::var("MESH_API_TOKEN") {
        Ok(token) if !token.is_empty() => {
            tracing::info!("API bearer-token auth enabled (MESH_API_TOKEN)");
            Some(Sha256::digest(token.as_bytes()).to_vec())
        }
        _ => {
            tracing::warn!("API bearer-token auth DISABLED — set MESH_API_TOKEN to enable");
            None
        }
    };

    let state = AppState {
        config: config.clone(),
        sessions,
        registry: registry.clone(),
        transport: transport.clone(),
        jobs,
        llm,
        tool_executor,
        routed_backend,
        chat_memory,
        api_token_hash,
    };

    // ── Periodic stale-device pruning ─────────────────────────────────
    // Devices not seen for 120 seconds are dropped, but the coordinator's
    // own record is re-touched first each tick since it never goes through
    // a ping/pong round trip to bump its `last_seen_ms` the way a connected
    // device does.
    {
        let registry = registry.clone();
        let self_id = self_id.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                if let Some(mut me) = registry.get(&self_id) {
                    me.last_seen_ms = now_ms();
                    registry.upsert(me);
                }
                let removed = registry.prune_stale(120_000);
                if removed > 0 {
                    tracing::info!(removed, "pruned stale devices");
                }
            }
        });
    }

    let app = api::router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(256))
        .with_state(state);

    let addr = normalize_bind_addr(&config.server.gateway_bind_addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding gateway address {addr}"))?;
    tracing::info!(%addr, "meshctl listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

/// `ServerConfig::gateway_bind_addr`'s default is a bare `:PORT` (no host);
/// fill in a wildcard host so it resolves as a socket address.
fn normalize_bind_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}
