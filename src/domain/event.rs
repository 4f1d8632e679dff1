//! The telemetry event: a named, timestamped unit of data with an
//! opaque JSON payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the default broadcast channel every authenticated connection
/// joins on connect.
pub const EVERYBODY: &str = "everybody";

/// A single telemetry event flowing through the bus.
///
/// Events are ephemeral: the bus keeps only the most recent payload per
/// name as a last-known value for late subscribers, never a history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Event name, e.g. `cpu.load` or `battery.percentage`.
    pub name: String,
    /// Opaque payload; producers decide the shape.
    pub payload: serde_json::Value,
    /// When the producer emitted the event.
    pub emitted_at: DateTime<Utc>,
    /// Which producer module emitted it.
    pub source_module: String,
    /// Broadcast scope: only members of this channel receive the event.
    pub channel: String,
}

impl TelemetryEvent {
    /// Creates an event scoped to the default [`EVERYBODY`] channel,
    /// stamped with the current time.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        payload: serde_json::Value,
        source_module: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            payload,
            emitted_at: Utc::now(),
            source_module: source_module.into(),
            channel: EVERYBODY.to_string(),
        }
    }

    /// Scopes the event to a specific channel instead of [`EVERYBODY`].
    #[must_use]
    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }
}
