//! Peer signaling broker.
//!
//! Relays WebRTC offer/answer/ICE payloads between two authenticated
//! connections so they can establish a direct data channel. The broker
//! never retries a failed relay: any call referencing a closed or
//! unknown session, or a target connection that is gone, fails with
//! `StaleSession` and the peers must re-negotiate from a fresh offer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::session::{PeerSession, PeerSignal, SessionState, SignalKind};
use crate::domain::{ConnectionId, ConnectionRegistry};
use crate::error::GatewayError;

/// Relays signaling payloads and tracks one [`PeerSession`] per
/// offer/answer exchange.
#[derive(Debug)]
pub struct SignalingBroker {
    sessions: RwLock<HashMap<Uuid, PeerSession>>,
    registry: Arc<ConnectionRegistry>,
}

impl SignalingBroker {
    /// Creates a broker relaying through the given registry.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry,
        }
    }

    /// Relays an offer from `from` to `to`, creating a session in
    /// [`SessionState::Offered`]. Returns the new session id.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Unauthorized`] unless both ends are
    /// authenticated; [`GatewayError::StaleSession`] when the target is
    /// not registered (or vanishes mid-relay).
    pub async fn relay_offer(
        &self,
        from: ConnectionId,
        to: ConnectionId,
        sdu: serde_json::Value,
    ) -> Result<Uuid, GatewayError> {
        if self.registry.get(to).await.is_none() {
            return Err(GatewayError::StaleSession(*to.as_uuid()));
        }
        if !self.registry.is_authenticated(from).await || !self.registry.is_authenticated(to).await
        {
            return Err(GatewayError::Unauthorized);
        }

        let session = PeerSession::new(from, to);
        let session_id = session.id;
        self.sessions.write().await.insert(session_id, session);

        let signal = PeerSignal {
            session_id,
            from,
            kind: SignalKind::Offer,
            sdu,
        };
        if let Err(err) = self.registry.send_signal(to, signal).await {
            self.sessions.write().await.remove(&session_id);
            tracing::warn!(session = %session_id, %err, "offer target gone; session dropped");
            return Err(GatewayError::StaleSession(*to.as_uuid()));
        }
        tracing::debug!(session = %session_id, %from, %to, "offer relayed");
        Ok(session_id)
    }

    /// Relays the responder's answer back to the initiator, moving the
    /// session `Offered → Answered`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StaleSession`] when the session is unknown,
    /// closed, or not in `Offered`; [`GatewayError::Unauthorized`] when
    /// `from` is not the session's responder.
    pub async fn relay_answer(
        &self,
        session_id: Uuid,
        from: ConnectionId,
        sdu: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let initiator = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(GatewayError::StaleSession(session_id))?;
            if session.state != SessionState::Offered {
                return Err(GatewayError::StaleSession(session_id));
            }
            if from != session.responder {
                return Err(GatewayError::Unauthorized);
            }
            session.state = SessionState::Answered;
            session.touched_at = tokio::time::Instant::now();
            session.initiator
        };

        let signal = PeerSignal {
            session_id,
            from,
            kind: SignalKind::Answer,
            sdu,
        };
        self.forward_or_close(session_id, initiator, signal).await
    }

    /// Relays an ICE candidate to the counterpart. Valid while the
    /// session is `Offered` or `Answered`; does not change state.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StaleSession`] for unknown/closed sessions or in
    /// a state past `Answered`; [`GatewayError::Unauthorized`] when
    /// `from` is not a participant.
    pub async fn relay_ice(
        &self,
        session_id: Uuid,
        from: ConnectionId,
        sdu: serde_json::Value,
    ) -> Result<(), GatewayError> {
        let target = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .get_mut(&session_id)
                .ok_or(GatewayError::StaleSession(session_id))?;
            if !matches!(session.state, SessionState::Offered | SessionState::Answered) {
                return Err(GatewayError::StaleSession(session_id));
            }
            let target = session
                .counterpart(from)
                .ok_or(GatewayError::Unauthorized)?;
            session.touched_at = tokio::time::Instant::now();
            target
        };

        let signal = PeerSignal {
            session_id,
            from,
            kind: SignalKind::Ice,
            sdu,
        };
        self.forward_or_close(session_id, target, signal).await
    }

    /// Marks the session `Connected` once a peer reports the direct
    /// channel is up. Informational; the data transport itself never
    /// touches the broker.
    ///
    /// # Errors
    ///
    /// [`GatewayError::StaleSession`] unless the session is in
    /// `Answered`; [`GatewayError::Unauthorized`] when `from` is not a
    /// participant.
    pub async fn notify_connected(
        &self,
        session_id: Uuid,
        from: ConnectionId,
    ) -> Result<(), GatewayError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or(GatewayError::StaleSession(session_id))?;
        if session.state != SessionState::Answered {
            return Err(GatewayError::StaleSession(session_id));
        }
        if session.counterpart(from).is_none() {
            return Err(GatewayError::Unauthorized);
        }
        session.state = SessionState::Connected;
        session.touched_at = tokio::time::Instant::now();
        tracing::info!(session = %session_id, "peer session connected");
        Ok(())
    }

    /// Closes a session and notifies both peers. Idempotent.
    pub async fn close_session(&self, session_id: Uuid) {
        let session = self.sessions.write().await.remove(&session_id);
        if let Some(session) = session {
            self.notify_closed(&session).await;
        }
    }

    /// Closes every session `connection_id` participates in. Part of the
    /// disconnect cascade.
    pub async fn close_for_connection(&self, connection_id: ConnectionId) {
        let removed: Vec<PeerSession> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .values()
                .filter(|s| s.initiator == connection_id || s.responder == connection_id)
                .map(|s| s.id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &removed {
            self.notify_closed(session).await;
        }
    }

    /// Closes every session. Used when the access key rotates.
    pub async fn close_all_sessions(&self) {
        let removed: Vec<PeerSession> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in &removed {
            self.notify_closed(session).await;
        }
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "all peer sessions closed");
        }
    }

    /// Closes sessions stuck in `Offered` or `Answered` longer than
    /// `max_idle` and reports them. Returns how many were closed.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let now = tokio::time::Instant::now();
        let removed: Vec<PeerSession> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .values()
                .filter(|s| {
                    matches!(s.state, SessionState::Offered | SessionState::Answered)
                        && now.duration_since(s.touched_at) > max_idle
                })
                .map(|s| s.id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };
        for session in &removed {
            tracing::warn!(session = %session.id, state = ?session.state, "peer session timed out during negotiation");
            self.notify_closed(session).await;
        }
        removed.len()
    }

    /// Current state of a session, if it is still tracked.
    pub async fn session_state(&self, session_id: Uuid) -> Option<SessionState> {
        self.sessions.read().await.get(&session_id).map(|s| s.state)
    }

    /// Number of tracked sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns `true` if no sessions are tracked.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn forward_or_close(
        &self,
        session_id: Uuid,
        target: ConnectionId,
        signal: PeerSignal,
    ) -> Result<(), GatewayError> {
        if self.registry.send_signal(target, signal).await.is_err() {
            self.close_session(session_id).await;
            tracing::warn!(session = %session_id, "relay target gone; session closed");
            return Err(GatewayError::StaleSession(session_id));
        }
        Ok(())
    }

    async fn notify_closed(&self, session: &PeerSession) {
        for peer in [session.initiator, session.responder] {
            let _ = self
                .registry
                .send_signal(peer, PeerSignal::closed(session.id, peer))
                .await;
        }
        tracing::debug!(session = %session.id, "peer session closed");
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::config::{SettingsSnapshot, settings_channel};
    use crate::domain::{ConnectionHandle, Transport};

    fn test_settings() -> SettingsSnapshot {
        SettingsSnapshot {
            api_port: 0,
            ws_port: 0,
            api_key: Some("secret".to_string()),
            launch_on_startup: false,
            event_bus_capacity: 64,
            auth_grace: Duration::from_millis(200),
            signal_idle_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_millis(500),
        }
    }

    async fn setup() -> (Arc<ConnectionRegistry>, SignalingBroker, ConnectionHandle, ConnectionHandle) {
        let (_tx, rx) = settings_channel(test_settings());
        let registry = Arc::new(ConnectionRegistry::new(rx));
        let broker = SignalingBroker::new(Arc::clone(&registry));

        let a = registry.register(Transport::WebSocket).await;
        let b = registry.register(Transport::WebSocket).await;
        let Ok(()) = registry.authenticate(a.id, "secret").await else {
            panic!("auth a failed");
        };
        let Ok(()) = registry.authenticate(b.id, "secret").await else {
            panic!("auth b failed");
        };
        (registry, broker, a, b)
    }

    #[tokio::test]
    async fn offer_answer_connected_drives_state_machine() {
        let (_registry, broker, a, b) = setup().await;

        let Ok(session) = broker
            .relay_offer(a.id, b.id, serde_json::json!({"sdp": "offer"}))
            .await
        else {
            panic!("offer failed");
        };
        assert_eq!(broker.session_state(session).await, Some(SessionState::Offered));

        let Ok(()) = broker
            .relay_answer(session, b.id, serde_json::json!({"sdp": "answer"}))
            .await
        else {
            panic!("answer failed");
        };
        assert_eq!(broker.session_state(session).await, Some(SessionState::Answered));

        let Ok(()) = broker.notify_connected(session, a.id).await else {
            panic!("connected failed");
        };
        assert_eq!(broker.session_state(session).await, Some(SessionState::Connected));
    }

    #[tokio::test]
    async fn ice_is_valid_in_offered_and_answered_only() {
        let (_registry, broker, a, b) = setup().await;
        let Ok(session) = broker.relay_offer(a.id, b.id, serde_json::json!({})).await else {
            panic!("offer failed");
        };

        assert!(broker.relay_ice(session, a.id, serde_json::json!({})).await.is_ok());
        let _ = broker.relay_answer(session, b.id, serde_json::json!({})).await;
        assert!(broker.relay_ice(session, b.id, serde_json::json!({})).await.is_ok());
        assert_eq!(broker.session_state(session).await, Some(SessionState::Answered));

        let _ = broker.notify_connected(session, a.id).await;
        let result = broker.relay_ice(session, a.id, serde_json::json!({})).await;
        assert!(matches!(result, Err(GatewayError::StaleSession(_))));
    }

    #[tokio::test]
    async fn relay_after_close_is_stale() {
        let (_registry, broker, a, b) = setup().await;
        let Ok(session) = broker.relay_offer(a.id, b.id, serde_json::json!({})).await else {
            panic!("offer failed");
        };

        broker.close_session(session).await;
        broker.close_session(session).await; // idempotent

        let result = broker.relay_answer(session, b.id, serde_json::json!({})).await;
        assert!(matches!(result, Err(GatewayError::StaleSession(_))));
    }

    #[tokio::test]
    async fn unauthenticated_peer_cannot_offer() {
        let (registry, broker, a, b) = setup().await;
        registry.revoke_all_auth().await;

        let result = broker.relay_offer(a.id, b.id, serde_json::json!({})).await;
        assert!(matches!(result, Err(GatewayError::Unauthorized)));
    }

    #[tokio::test]
    async fn offer_to_unknown_target_is_stale() {
        let (registry, broker, a, b) = setup().await;
        registry.remove(b.id).await;

        let result = broker.relay_offer(a.id, b.id, serde_json::json!({})).await;
        assert!(matches!(result, Err(GatewayError::StaleSession(_))));
    }

    #[tokio::test]
    async fn non_participant_cannot_answer() {
        let (registry, broker, a, b) = setup().await;
        let c = registry.register(Transport::WebSocket).await;
        let Ok(()) = registry.authenticate(c.id, "secret").await else {
            panic!("auth c failed");
        };

        let Ok(session) = broker.relay_offer(a.id, b.id, serde_json::json!({})).await else {
            panic!("offer failed");
        };
        let result = broker.relay_answer(session, c.id, serde_json::json!({})).await;
        assert!(matches!(result, Err(GatewayError::Unauthorized)));
    }

    #[tokio::test]
    async fn disconnect_cascade_closes_sessions() {
        let (_registry, broker, a, b) = setup().await;
        let Ok(session) = broker.relay_offer(a.id, b.id, serde_json::json!({})).await else {
            panic!("offer failed");
        };

        broker.close_for_connection(b.id).await;
        assert!(broker.is_empty().await);

        let result = broker.relay_ice(session, a.id, serde_json::json!({})).await;
        assert!(matches!(result, Err(GatewayError::StaleSession(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_negotiations_are_swept() {
        let (_registry, broker, a, b) = setup().await;
        let Ok(offered) = broker.relay_offer(a.id, b.id, serde_json::json!({})).await else {
            panic!("offer failed");
        };
        let Ok(answered) = broker.relay_offer(a.id, b.id, serde_json::json!({})).await else {
            panic!("offer failed");
        };
        let _ = broker.relay_answer(answered, b.id, serde_json::json!({})).await;
        let _ = broker.notify_connected(answered, a.id).await;

        tokio::time::advance(Duration::from_secs(31)).await;

        // The Offered session times out; the Connected one survives.
        let closed = broker.sweep_idle(Duration::from_secs(30)).await;
        assert_eq!(closed, 1);
        assert_eq!(broker.session_state(offered).await, None);
        assert_eq!(broker.session_state(answered).await, Some(SessionState::Connected));
    }
}
