//! Coordinator configuration (spec §6), sourced entirely from environment
//! variables via `Config::from_env()`. Grounded on `sa-domain::config`'s
//! per-concern submodule pattern and its `validate()` / `ConfigSeverity`
//! convention.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            llm: LlmConfig::default(),
            log: LogConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Primary RPC bind address (device channel + client RPC surface).
    #[serde(default = "d_rpc_addr")]
    pub rpc_bind_addr: String,
    /// Gateway (JSON façade) bind address.
    #[serde(default = "d_gateway_addr")]
    pub gateway_bind_addr: String,
    /// Override the coordinator's own device id, for testing.
    #[serde(default)]
    pub device_id_override: Option<String>,
    /// Default deadline (seconds) applied when a caller supplies none
    /// (spec §9 design note: "treat a missing deadline as a bug ... default
    /// to a conservative one").
    #[serde(default = "d_30")]
    pub default_deadline_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rpc_bind_addr: d_rpc_addr(),
            gateway_bind_addr: d_gateway_addr(),
            device_id_override: None,
            default_deadline_secs: d_30(),
        }
    }
}

fn d_rpc_addr() -> String {
    ":50051".to_string()
}
fn d_gateway_addr() -> String {
    ":8080".to_string()
}
fn d_30() -> u64 {
    30
}

// ─────────────────────────────────────────────────────────────────────────
// Auth (session key)
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared secret placeholder (spec §1 non-goal: no real identity).
    #[serde(default = "d_session_key")]
    pub shared_session_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            shared_session_key: d_session_key(),
        }
    }
}

fn d_session_key() -> String {
    "dev".to_string()
}

// ─────────────────────────────────────────────────────────────────────────
// LLM (chat-model provider selector)
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    OpenaiCompat,
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model_name")]
    pub model_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "d_30")]
    pub timeout_secs: u64,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    /// Agent loop iteration budget (spec §4.8 default 8).
    #[serde(default = "d_max_iterations")]
    pub max_iterations: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: d_base_url(),
            model_name: d_model_name(),
            api_key: None,
            timeout_secs: d_30(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            max_iterations: d_max_iterations(),
        }
    }
}

fn d_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}
fn d_model_name() -> String {
    "default".to_string()
}
fn d_temperature() -> f32 {
    0.2
}
fn d_max_tokens() -> u32 {
    1024
}
fn d_max_iterations() -> u32 {
    8
}

// ─────────────────────────────────────────────────────────────────────────
// Log (ambient)
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "d_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: d_log_filter(),
            json: false,
        }
    }
}

fn d_log_filter() -> String {
    "info,meshd=debug".to_string()
}

// ─────────────────────────────────────────────────────────────────────────
// Validation
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

impl Config {
    /// Load from environment variables layered over defaults, matching the
    /// enumerated vars in spec §6.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        if let Ok(v) = std::env::var("MESH_RPC_ADDR") {
            cfg.server.rpc_bind_addr = v;
        }
        if let Ok(v) = std::env::var("MESH_GATEWAY_ADDR") {
            cfg.server.gateway_bind_addr = v;
        }
        if let Ok(v) = std::env::var("MESH_SESSION_KEY") {
            cfg.auth.shared_session_key = v;
        }
        if let Ok(v) = std::env::var("MESH_DEVICE_ID_OVERRIDE") {
            cfg.server.device_id_override = Some(v);
        }
        if let Ok(v) = std::env::var("MESH_LLM_PROVIDER") {
            cfg.llm.provider = match v.as_str() {
                "scripted" => ProviderKind::Scripted,
                _ => ProviderKind::OpenaiCompat,
            };
        }
        if let Ok(v) = std::env::var("MESH_LLM_BASE_URL") {
            cfg.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("MESH_LLM_MODEL") {
            cfg.llm.model_name = v;
        }
        if let Ok(v) = std::env::var("MESH_LLM_API_KEY") {
            cfg.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("MESH_LLM_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                cfg.llm.timeout_secs = n;
            }
        }
        if let Ok(v) = std::env::var("MESH_LLM_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                cfg.llm.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("MESH_LLM_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                cfg.llm.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("MESH_LLM_MAX_ITERATIONS") {
            if let Ok(n) = v.parse() {
                cfg.llm.max_iterations = n;
            }
        }
        if let Ok(v) = std::env::var("MESH_LOG_FILTER") {
            cfg.log.filter = v;
        }
        if std::env::var("MESH_LOG_JSON").is_ok() {
            cfg.log.json = true;
        }
        cfg
    }

    /// Validate the config, returning warnings/errors (never panics).
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.auth.shared_session_key == "dev" {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "using the default shared session key 'dev'; set MESH_SESSION_KEY for anything beyond local testing".into(),
            });
        }
        if self.llm.max_iterations == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "llm.max_iterations must be >= 1".into(),
            });
        }
        if self.server.default_deadline_secs == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "server.default_deadline_secs must be >= 1".into(),
            });
        }
        issues
    }
}
