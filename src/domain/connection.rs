//! Connection identity and per-connection state.
//!
//! A [`Connection`] is owned exclusively by the
//! [`ConnectionRegistry`](super::ConnectionRegistry); transports hold
//! only a [`ConnectionId`] and the receiving halves bundled in a
//! [`ConnectionHandle`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::signaling::PeerSignal;

/// Unique identifier for a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh random connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Transport a connection arrived over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// One-shot REST request.
    Rest,
    /// Long-lived WebSocket.
    WebSocket,
    /// WebRTC signaling participant.
    PeerSignaling,
}

/// Why the gateway closed a connection.
///
/// Each reason maps to a distinct WebSocket close code so clients can
/// tell "try again later" from "fix your credentials" from "malformed
/// request".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the connection or the request completed.
    Normal,
    /// Missing, late, or wrong access key.
    Unauthorized,
    /// The connection sent a frame the gateway could not decode.
    ProtocolError,
    /// The gateway is shutting down.
    Shutdown,
    /// A settings change is rebinding the listeners; reconnect shortly.
    Restarting,
}

impl CloseReason {
    /// WebSocket close code for this reason.
    #[must_use]
    pub const fn ws_code(&self) -> u16 {
        match self {
            Self::Normal => 1000,
            Self::Unauthorized => 4001,
            Self::ProtocolError => 4002,
            Self::Shutdown => 1001,
            Self::Restarting => 1012,
        }
    }

    /// Short machine-readable reason string sent in the close frame.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "closed",
            Self::Unauthorized => "unauthorized",
            Self::ProtocolError => "protocol error",
            Self::Shutdown => "shutting down",
            Self::Restarting => "restarting",
        }
    }
}

/// Registry-owned record for one live connection.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique id handed to the transport.
    pub id: ConnectionId,
    /// Transport the connection arrived over.
    pub transport: Transport,
    /// Whether the access key has been presented and accepted.
    pub authenticated: bool,
    /// Broadcast channels this connection is a member of.
    pub channels: HashSet<String>,
    /// When the connection registered.
    pub created_at: DateTime<Utc>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, transport: Transport) -> Self {
        Self {
            id,
            transport,
            authenticated: false,
            channels: HashSet::new(),
            created_at: Utc::now(),
        }
    }
}

/// Receiving halves handed to the transport task that owns the socket.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// The registered connection's id.
    pub id: ConnectionId,
    /// Fires when the gateway wants this connection closed.
    pub close_rx: watch::Receiver<Option<CloseReason>>,
    /// Inbound peer-signaling frames relayed to this connection.
    pub signal_rx: mpsc::Receiver<PeerSignal>,
}
