//! `RoutingPolicy` (spec §3/§4.2): a declarative rule for selecting one
//! device from the registry.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RoutingPolicy {
    BestAvailable,
    RequireNpu,
    PreferRemote,
    ForceDeviceId { device_id: String },
    PreferLocalModel,
    RequireLocalModel,
}

/// Outcome of a successful selection (spec §4.2/§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub device_id: String,
    pub device_name: String,
    pub device_address: String,
    pub executed_locally: bool,
}
