//! Peer session state machine and relayed signal frames.

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::domain::ConnectionId;

/// Lifecycle of one WebRTC-style signaling exchange between two
/// connections.
///
/// Legal transitions: `Offered → Answered → Connected`, and any
/// non-closed state `→ Closed` on abandonment, timeout, or disconnect
/// of either side. A closed session is removed; referencing it again
/// yields `StaleSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Offer relayed to the responder; waiting for an answer.
    Offered,
    /// Answer relayed back to the initiator.
    Answered,
    /// Peers report their direct data channel is up (informational).
    Connected,
    /// Torn down; kept only as a variant for reporting.
    Closed,
}

/// One negotiated peer session tracked by the broker.
#[derive(Debug, Clone)]
pub struct PeerSession {
    /// Session identifier shared with both peers.
    pub id: Uuid,
    /// Connection that sent the offer.
    pub initiator: ConnectionId,
    /// Connection the offer was addressed to.
    pub responder: ConnectionId,
    /// Current state machine position.
    pub state: SessionState,
    /// Last relay activity; drives the idle sweep.
    pub touched_at: Instant,
}

impl PeerSession {
    pub(crate) fn new(initiator: ConnectionId, responder: ConnectionId) -> Self {
        Self {
            id: Uuid::new_v4(),
            initiator,
            responder,
            state: SessionState::Offered,
            touched_at: Instant::now(),
        }
    }

    /// The session participant that is not `from`, if `from` is a
    /// participant at all.
    #[must_use]
    pub fn counterpart(&self, from: ConnectionId) -> Option<ConnectionId> {
        if from == self.initiator {
            Some(self.responder)
        } else if from == self.responder {
            Some(self.initiator)
        } else {
            None
        }
    }
}

/// What a relayed signal frame means to its receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// SDP offer from the initiator.
    Offer,
    /// SDP answer from the responder.
    Answer,
    /// ICE candidate from either side.
    Ice,
    /// The broker closed the session (disconnect, timeout, rotation).
    Closed,
}

/// A signaling frame queued for delivery to one connection.
#[derive(Debug, Clone)]
pub struct PeerSignal {
    /// Session the frame belongs to.
    pub session_id: Uuid,
    /// Connection the frame originated from (the broker itself for
    /// [`SignalKind::Closed`]).
    pub from: ConnectionId,
    /// Frame discriminator.
    pub kind: SignalKind,
    /// Opaque signaling payload (SDP or ICE candidate).
    pub sdu: serde_json::Value,
}

impl PeerSignal {
    /// Builds the close notice the broker sends to both peers.
    #[must_use]
    pub fn closed(session_id: Uuid, from: ConnectionId) -> Self {
        Self {
            session_id,
            from,
            kind: SignalKind::Closed,
            sdu: serde_json::Value::Null,
        }
    }
}
