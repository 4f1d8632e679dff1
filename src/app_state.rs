//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::config::SettingsRx;
use crate::lifecycle::Lifecycle;
use crate::service::SessionService;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session service orchestrating registry, bus, and broker.
    pub service: Arc<SessionService>,
    /// Lifecycle controller; handlers hand settings changes to it.
    pub lifecycle: Arc<Lifecycle>,
    /// Current settings snapshot (atomically replaced on change).
    pub settings: SettingsRx,
    /// Stable identifier carried in the discovery record.
    pub instance_id: String,
}
