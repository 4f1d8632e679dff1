//! # telebridge
//!
//! Telemetry event gateway: aggregates machine telemetry events from
//! producer modules and distributes them in real time to remote clients
//! over REST, WebSocket, and WebRTC peer channels (signaled through the
//! built-in broker), while advertising itself on the local network over
//! mDNS.
//!
//! ## Architecture
//!
//! ```text
//! Producers (CPU, memory, battery, ...)
//!     │ publish
//!     ▼
//! EventBus (domain/) ── last-known-value cache, drop accounting
//!     │ fan-out
//!     ├── REST Handlers (api/)          GET /state, POST /settings
//!     ├── WS Connections (ws/)          auth, subscribe, events
//!     │       └── ConnectionRegistry (domain/)  channels, auth state
//!     ├── SignalingBroker (signaling/)  offer/answer/ICE relay
//!     ├── DiscoveryAdvertiser           _telebridge._tcp mDNS record
//!     └── Lifecycle                     start / apply_settings / stop
//! ```
//!
//! Producers are external collaborators: each holds a clone of
//! [`domain::EventBus`] and publishes named events on its own schedule.
//! Delivery to clients is best-effort freshness — a bounded ring per
//! subscriber, oldest events dropped first, with a counter for
//! observability.

pub mod api;
pub mod app_state;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod service;
pub mod signaling;
pub mod ws;
