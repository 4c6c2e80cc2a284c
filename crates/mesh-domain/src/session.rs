//! The `Session` data model (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A session record, created by `CreateSession` (spec §4.3/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub device_name: String,
    pub created_at: DateTime<Utc>,
}
