//! Shared `ReadFile` request/response shapes (spec §4.7/§4.9).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    #[default]
    Full,
    Head,
    Tail,
    Range,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileRequest {
    /// Empty means "read locally on the coordinator".
    #[serde(default)]
    pub device_id: String,
    pub path: String,
    #[serde(default)]
    pub mode: ReadMode,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
}

pub fn default_max_bytes() -> u64 {
    65_536
}

pub const MAX_READ_BYTES: u64 = 10_485_760;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReadFileResponse {
    /// Base64-encoded raw bytes actually returned.
    pub content_base64: String,
    /// A short human-readable preview (best-effort UTF-8 decode, truncated).
    pub content_preview: String,
    pub size_bytes: u64,
    pub bytes_returned: u64,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
