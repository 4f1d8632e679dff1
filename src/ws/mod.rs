//! WebSocket layer: connection handling and wire messages.
//!
//! The WebSocket endpoint (its own listener, `ws_port`) carries
//! authentication, event subscriptions, and peer signaling for each
//! client.

pub mod connection;
pub mod handler;
pub mod messages;
