//! Concurrent connection storage and channel membership.
//!
//! [`ConnectionRegistry`] owns every live [`Connection`] behind a
//! [`tokio::sync::RwLock`]. All mutation goes through registry methods so
//! that removal, authentication revocation, and close signaling stay
//! atomic with respect to concurrent publish and relay operations: once
//! `remove` returns, no frame can be delivered to that connection.
//!
//! The wider disconnect cascade (event-bus unsubscribe, peer-session
//! close) is orchestrated by `SessionService`, keeping this type free of
//! dependencies on the bus and broker.

use std::collections::HashMap;

use tokio::sync::{RwLock, mpsc, watch};

use super::connection::{CloseReason, Connection, ConnectionHandle, ConnectionId, Transport};
use super::event::EVERYBODY;
use crate::config::SettingsRx;
use crate::error::GatewayError;
use crate::signaling::PeerSignal;

/// How many relayed signaling frames may queue per connection before the
/// oldest pending relay is dropped on the floor.
const SIGNAL_QUEUE_DEPTH: usize = 64;

struct Slot {
    conn: Connection,
    close_tx: watch::Sender<Option<CloseReason>>,
    signal_tx: mpsc::Sender<PeerSignal>,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("conn", &self.conn).finish()
    }
}

/// Central store for all live client connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    slots: RwLock<HashMap<ConnectionId, Slot>>,
    settings: SettingsRx,
}

impl ConnectionRegistry {
    /// Creates an empty registry reading access keys from `settings`.
    #[must_use]
    pub fn new(settings: SettingsRx) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            settings,
        }
    }

    /// Registers a new, unauthenticated connection and returns the
    /// handle its transport task drives.
    pub async fn register(&self, transport: Transport) -> ConnectionHandle {
        let id = ConnectionId::new();
        let (close_tx, close_rx) = watch::channel(None);
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);

        let slot = Slot {
            conn: Connection::new(id, transport),
            close_tx,
            signal_tx,
        };
        self.slots.write().await.insert(id, slot);
        tracing::debug!(connection = %id, ?transport, "connection registered");

        ConnectionHandle {
            id,
            close_rx,
            signal_rx,
        }
    }

    /// Authenticates a connection against the current settings snapshot.
    ///
    /// On success the connection joins the default [`EVERYBODY`] channel.
    /// A connection may re-authenticate after a key rotation.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ConnectionNotFound`] when the id is not
    /// registered, [`GatewayError::Unauthorized`] when the presented key
    /// does not match (or no key is configured). Callers are expected to
    /// close the transport on `Unauthorized`; no detail is leaked.
    pub async fn authenticate(
        &self,
        id: ConnectionId,
        presented_key: &str,
    ) -> Result<(), GatewayError> {
        let expected = self.settings.borrow().api_key.clone();
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or(GatewayError::ConnectionNotFound(*id.as_uuid()))?;

        match expected {
            Some(key) if key == presented_key => {
                slot.conn.authenticated = true;
                slot.conn.channels.insert(EVERYBODY.to_string());
                tracing::info!(connection = %id, "connection authenticated");
                Ok(())
            }
            _ => Err(GatewayError::Unauthorized),
        }
    }

    /// Returns `true` if the connection exists and is authenticated.
    pub async fn is_authenticated(&self, id: ConnectionId) -> bool {
        self.slots
            .read()
            .await
            .get(&id)
            .is_some_and(|s| s.conn.authenticated)
    }

    /// Adds the connection to a broadcast channel.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Unauthorized`] unless the connection is
    /// authenticated; [`GatewayError::ConnectionNotFound`] when it is
    /// not registered.
    pub async fn join(&self, id: ConnectionId, channel: &str) -> Result<(), GatewayError> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or(GatewayError::ConnectionNotFound(*id.as_uuid()))?;
        if !slot.conn.authenticated {
            return Err(GatewayError::Unauthorized);
        }
        slot.conn.channels.insert(channel.to_string());
        Ok(())
    }

    /// Removes the connection from a broadcast channel.
    ///
    /// # Errors
    ///
    /// Same conditions as [`ConnectionRegistry::join`].
    pub async fn leave(&self, id: ConnectionId, channel: &str) -> Result<(), GatewayError> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or(GatewayError::ConnectionNotFound(*id.as_uuid()))?;
        if !slot.conn.authenticated {
            return Err(GatewayError::Unauthorized);
        }
        slot.conn.channels.remove(channel);
        Ok(())
    }

    /// Returns `true` if the connection is a member of the channel.
    pub async fn is_member(&self, id: ConnectionId, channel: &str) -> bool {
        self.slots
            .read()
            .await
            .get(&id)
            .is_some_and(|s| s.conn.channels.contains(channel))
    }

    /// Signals the transport task of `id` to close with the given
    /// reason. The task sends the close frame and then disconnects.
    pub async fn signal_close(&self, id: ConnectionId, reason: CloseReason) {
        if let Some(slot) = self.slots.read().await.get(&id) {
            let _ = slot.close_tx.send(Some(reason));
        }
    }

    /// Signals every live connection to close with the given reason.
    /// Used on shutdown and settings-driven listener restarts.
    pub async fn close_all(&self, reason: CloseReason) {
        let slots = self.slots.read().await;
        for slot in slots.values() {
            let _ = slot.close_tx.send(Some(reason));
        }
        tracing::info!(count = slots.len(), reason = reason.as_str(), "closing all connections");
    }

    /// Removes a connection. Idempotent: removing an unknown or
    /// already-removed id is a no-op. Returns whether it was present.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let removed = self.slots.write().await.remove(&id).is_some();
        if removed {
            tracing::debug!(connection = %id, "connection removed");
        }
        removed
    }

    /// Marks every connection unauthenticated and clears its channel
    /// memberships. Called when the access key rotates: connections stay
    /// up but must re-authenticate with the new key before any further
    /// non-trivial operation.
    pub async fn revoke_all_auth(&self) {
        let mut slots = self.slots.write().await;
        for slot in slots.values_mut() {
            slot.conn.authenticated = false;
            slot.conn.channels.clear();
        }
        tracing::info!(count = slots.len(), "authentication revoked for all connections");
    }

    /// Relays a peer-signaling frame to the target connection's queue.
    ///
    /// Best-effort: a full queue drops the frame with a warning rather
    /// than blocking the relay.
    ///
    /// # Errors
    ///
    /// [`GatewayError::ConnectionNotFound`] when the target is gone.
    pub async fn send_signal(&self, id: ConnectionId, signal: PeerSignal) -> Result<(), GatewayError> {
        let slots = self.slots.read().await;
        let slot = slots
            .get(&id)
            .ok_or(GatewayError::ConnectionNotFound(*id.as_uuid()))?;
        if let Err(mpsc::error::TrySendError::Full(_)) = slot.signal_tx.try_send(signal) {
            tracing::warn!(connection = %id, "signal queue full; dropping relay frame");
        }
        Ok(())
    }

    /// Returns a snapshot of the connection record, if registered.
    pub async fn get(&self, id: ConnectionId) -> Option<Connection> {
        self.slots.read().await.get(&id).map(|s| s.conn.clone())
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Returns `true` if no connections are registered.
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}
