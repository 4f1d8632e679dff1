//! Session service: orchestrates connections across registry, bus, and
//! broker.

use std::sync::Arc;

use crate::domain::{
    CloseReason, ConnectionHandle, ConnectionId, ConnectionRegistry, EventBus, TelemetryEvent,
};
use crate::error::GatewayError;
use crate::signaling::SignalingBroker;

/// Stateless coordinator over the connection registry, event bus, and
/// signaling broker.
///
/// Exists so the disconnect cascade lives in exactly one place: a
/// removed connection is atomically unsubscribed from the bus, dropped
/// from all channels, and stripped of its peer sessions, and can never
/// receive a late event afterwards.
#[derive(Debug, Clone)]
pub struct SessionService {
    registry: Arc<ConnectionRegistry>,
    event_bus: EventBus,
    broker: Arc<SignalingBroker>,
}

impl SessionService {
    /// Creates a new `SessionService`.
    #[must_use]
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        event_bus: EventBus,
        broker: Arc<SignalingBroker>,
    ) -> Self {
        Self {
            registry,
            event_bus,
            broker,
        }
    }

    /// Returns a reference to the inner [`EventBus`].
    #[must_use]
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Returns a reference to the inner [`ConnectionRegistry`].
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns a reference to the inner [`SignalingBroker`].
    #[must_use]
    pub fn broker(&self) -> &Arc<SignalingBroker> {
        &self.broker
    }

    /// Registers a new connection on the given transport.
    pub async fn connect(&self, transport: crate::domain::Transport) -> ConnectionHandle {
        self.registry.register(transport).await
    }

    /// Authenticates a connection against the current access key.
    ///
    /// # Errors
    ///
    /// Propagates [`GatewayError::Unauthorized`] /
    /// [`GatewayError::ConnectionNotFound`] from the registry; the
    /// transport is expected to close the connection on failure.
    pub async fn authenticate(&self, id: ConnectionId, key: &str) -> Result<(), GatewayError> {
        self.registry.authenticate(id, key).await
    }

    /// Tears a connection down: close signal, registry removal, bus
    /// unsubscription, and peer-session closure.
    ///
    /// Idempotent; a second call for the same id is a no-op. In-flight
    /// deliveries racing this cascade are discarded by the transport
    /// task, never an error.
    pub async fn disconnect(&self, id: ConnectionId, reason: CloseReason) {
        self.registry.signal_close(id, reason).await;
        if self.registry.remove(id).await {
            self.event_bus.unsubscribe_all(id).await;
            self.broker.close_for_connection(id).await;
            tracing::info!(connection = %id, reason = reason.as_str(), "connection disconnected");
        }
    }

    /// Publishes an event scoped to a broadcast channel; `None` means
    /// the default `everybody` channel. Returns the receiver count.
    pub async fn broadcast(
        &self,
        name: impl Into<String>,
        payload: serde_json::Value,
        source_module: impl Into<String>,
        channel: Option<&str>,
    ) -> usize {
        let mut event = TelemetryEvent::new(name, payload, source_module);
        if let Some(channel) = channel {
            event = event.on_channel(channel);
        }
        self.event_bus.publish(event).await
    }
}
