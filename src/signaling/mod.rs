//! Peer signaling: WebRTC offer/answer/ICE relay between connections.
//!
//! The broker only negotiates; once peers connect directly, their data
//! channel bypasses the gateway entirely. The bus and REST/WS paths are
//! the fallback when peer connections are unavailable.

pub mod broker;
pub mod session;

pub use broker::SignalingBroker;
pub use session::{PeerSession, PeerSignal, SessionState, SignalKind};
