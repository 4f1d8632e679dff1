//! Request and response DTOs for the REST surface.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for `GET /api/v1/state`.
#[derive(Debug, Deserialize, IntoParams)]
pub struct StateQuery {
    /// Comma-separated event names to read; omit for every cached name.
    pub events: Option<String>,
}

/// Partial settings update accepted by `POST /api/v1/settings`.
///
/// Absent fields keep their current values. `clear_api_key` removes the
/// access key entirely, which also stops the discovery advertiser and
/// the signaling broker.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdateRequest {
    /// New REST listener port.
    pub api_port: Option<u16>,
    /// New WebSocket listener port.
    pub ws_port: Option<u16>,
    /// New access key.
    pub api_key: Option<String>,
    /// Remove the access key (wins over `api_key`).
    #[serde(default)]
    pub clear_api_key: bool,
    /// Launch-on-startup flag, round-tripped to the desktop shell.
    pub launch_on_startup: Option<bool>,
}

/// Body returned by `POST /api/v1/settings`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SettingsAccepted {
    /// Always `"accepted"`; the reconfiguration is applied
    /// asynchronously so a listener rebind cannot deadlock the request
    /// that asked for it.
    pub status: String,
}

/// Body returned by `GET /discovery`, mirroring the mDNS record.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResponse {
    /// Stable instance identifier.
    pub instance_id: String,
    /// REST listener port.
    pub api_port: u16,
    /// WebSocket listener port.
    pub ws_port: u16,
}

/// Body returned by `GET /health`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `"healthy"` while the process serves requests.
    pub status: String,
    /// Current server time, RFC 3339.
    pub timestamp: String,
    /// Crate version.
    pub version: String,
    /// Live client connections.
    pub connections: usize,
    /// Events lost to lagging subscribers since startup
    /// (observability-only, never a client-visible error).
    pub dropped_events: u64,
}
