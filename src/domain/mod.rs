//! Domain layer: events, the event bus, connections, and subscriptions.
//!
//! This module contains the gateway's core model: telemetry event
//! identity, the broadcast bus with its last-known-value cache, the
//! connection registry with channel membership, and per-connection
//! subscription sets.

pub mod connection;
pub mod event;
pub mod event_bus;
pub mod registry;
pub mod subscription;

pub use connection::{CloseReason, Connection, ConnectionHandle, ConnectionId, Transport};
pub use event::{EVERYBODY, TelemetryEvent};
pub use event_bus::{BusSubscriber, EventBus};
pub use registry::ConnectionRegistry;
pub use subscription::SubscriptionSet;
