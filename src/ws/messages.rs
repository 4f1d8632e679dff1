//! WebSocket wire messages: inbound commands and outbound frames.
//!
//! All frames are JSON objects discriminated by a `type` field, e.g.
//! `{"type":"auth","key":"..."}` inbound and
//! `{"type":"event","name":"cpu.load","payload":42,...}` outbound.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ConnectionId;

/// Client → server frames.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Present the access key. Must be the first frame on a fresh
    /// connection; accepted again later to re-authenticate after a key
    /// rotation.
    Auth {
        /// The access key.
        key: String,
    },
    /// Subscribe to an event name, or `"*"` for all events.
    Subscribe {
        /// Exact event name or the wildcard.
        pattern: String,
    },
    /// Drop a subscription.
    Unsubscribe {
        /// Exact event name or the wildcard.
        pattern: String,
    },
    /// Join a broadcast channel.
    Join {
        /// Channel name.
        channel: String,
    },
    /// Leave a broadcast channel.
    Leave {
        /// Channel name.
        channel: String,
    },
    /// Relay a WebRTC offer to another connection.
    #[serde(rename_all = "camelCase")]
    Offer {
        /// Target connection.
        to_connection_id: ConnectionId,
        /// Opaque SDP payload.
        sdu: serde_json::Value,
    },
    /// Relay a WebRTC answer back through an offered session.
    #[serde(rename_all = "camelCase")]
    Answer {
        /// Session created by the offer.
        session_id: Uuid,
        /// Opaque SDP payload.
        sdu: serde_json::Value,
    },
    /// Relay an ICE candidate through a negotiating session.
    #[serde(rename_all = "camelCase")]
    Ice {
        /// Session being negotiated.
        session_id: Uuid,
        /// Opaque candidate payload.
        sdu: serde_json::Value,
    },
    /// Report that the direct peer channel is up.
    #[serde(rename_all = "camelCase")]
    Connected {
        /// Session that connected.
        session_id: Uuid,
    },
}

/// Server → client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Authentication accepted; tells the client its connection id so
    /// peers can address each other in signaling frames.
    #[serde(rename_all = "camelCase")]
    AuthOk {
        /// The client's connection id.
        connection_id: ConnectionId,
    },
    /// A telemetry event matching one of the client's subscriptions.
    #[serde(rename_all = "camelCase")]
    Event {
        /// Event name.
        name: String,
        /// Opaque payload.
        payload: serde_json::Value,
        /// When the producer emitted it.
        emitted_at: DateTime<Utc>,
        /// Producer module that emitted it.
        source_module: String,
    },
    /// Subscription acknowledged.
    Subscribed {
        /// The pattern now in effect.
        pattern: String,
    },
    /// Unsubscription acknowledged.
    Unsubscribed {
        /// The pattern removed.
        pattern: String,
    },
    /// Channel join acknowledged.
    Joined {
        /// The channel joined.
        channel: String,
    },
    /// Channel leave acknowledged.
    Left {
        /// The channel left.
        channel: String,
    },
    /// Offer relayed; the session id correlates the rest of the
    /// exchange.
    #[serde(rename_all = "camelCase")]
    Offered {
        /// Newly created session.
        session_id: Uuid,
    },
    /// An offer relayed from a peer.
    #[serde(rename_all = "camelCase")]
    Offer {
        /// Session created for this exchange.
        session_id: Uuid,
        /// Peer that sent the offer.
        from_connection_id: ConnectionId,
        /// Opaque SDP payload.
        sdu: serde_json::Value,
    },
    /// An answer relayed from a peer.
    #[serde(rename_all = "camelCase")]
    Answer {
        /// Session being answered.
        session_id: Uuid,
        /// Peer that answered.
        from_connection_id: ConnectionId,
        /// Opaque SDP payload.
        sdu: serde_json::Value,
    },
    /// An ICE candidate relayed from a peer.
    #[serde(rename_all = "camelCase")]
    Ice {
        /// Session being negotiated.
        session_id: Uuid,
        /// Peer that sent the candidate.
        from_connection_id: ConnectionId,
        /// Opaque candidate payload.
        sdu: serde_json::Value,
    },
    /// The broker closed a session (peer gone, timeout, key rotation).
    #[serde(rename_all = "camelCase")]
    SessionClosed {
        /// The closed session.
        session_id: Uuid,
    },
    /// A command failed; the connection stays open.
    Error {
        /// Numeric error code (see the error taxonomy).
        code: u32,
        /// Human-readable message.
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn auth_frame_round_trips() {
        let Ok(msg) = serde_json::from_str::<ClientMessage>(r#"{"type":"auth","key":"k"}"#) else {
            panic!("auth frame failed to parse");
        };
        assert!(matches!(msg, ClientMessage::Auth { key } if key == "k"));
    }

    #[test]
    fn offer_frame_uses_camel_case_target() {
        let id = ConnectionId::new();
        let raw = format!(r#"{{"type":"offer","toConnectionId":"{id}","sdu":{{"sdp":"x"}}}}"#);
        let Ok(msg) = serde_json::from_str::<ClientMessage>(&raw) else {
            panic!("offer frame failed to parse");
        };
        assert!(matches!(msg, ClientMessage::Offer { to_connection_id, .. } if to_connection_id == id));
    }

    #[test]
    fn event_frame_serializes_with_tag() {
        let frame = ServerMessage::Event {
            name: "cpu.load".to_string(),
            payload: serde_json::json!(42),
            emitted_at: Utc::now(),
            source_module: "cpu".to_string(),
        };
        let Ok(json) = serde_json::to_value(&frame) else {
            panic!("event frame failed to serialize");
        };
        assert_eq!(json.get("type"), Some(&serde_json::json!("event")));
        assert_eq!(json.get("name"), Some(&serde_json::json!("cpu.load")));
        assert!(json.get("emittedAt").is_some());
    }
}
