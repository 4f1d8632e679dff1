//! Gateway configuration: the immutable settings snapshot.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). A [`SettingsSnapshot`] is immutable
//! once constructed; reconfiguration replaces the whole value atomically
//! through a `tokio::sync::watch` channel owned by the lifecycle
//! controller — no component ever observes a torn mix of old and new
//! fields.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Immutable gateway settings in effect at a point in time.
///
/// Loaded at startup via [`SettingsSnapshot::from_env`] and replaced
/// wholesale by `Lifecycle::apply_settings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// Port the REST listener binds to (`0` = OS-assigned).
    pub api_port: u16,

    /// Port the WebSocket listener binds to (`0` = OS-assigned).
    pub ws_port: u16,

    /// Shared access key clients authenticate with. When absent, the
    /// discovery advertiser and the peer-signaling broker do not run.
    pub api_key: Option<String>,

    /// Whether the host shell should launch the gateway on login.
    /// Consumed by the desktop shell, not by this core; carried so a
    /// settings update round-trips it unchanged.
    pub launch_on_startup: bool,

    /// Capacity of the event bus broadcast ring. This is also the
    /// per-subscriber delivery bound: a subscriber lagging further than
    /// this loses its oldest undelivered events.
    pub event_bus_capacity: usize,

    /// How long an unauthenticated WebSocket may stay open before it is
    /// closed with an unauthorized close code.
    pub auth_grace: Duration,

    /// How long a peer session may idle in `Offered` or `Answered`
    /// before the broker closes it.
    pub signal_idle_timeout: Duration,

    /// How long to wait for listeners to drain on shutdown or rebind
    /// before force-aborting them.
    pub shutdown_grace: Duration,
}

impl SettingsSnapshot {
    /// Loads the initial snapshot from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            api_port: parse_env("TELEBRIDGE_API_PORT", 9170),
            ws_port: parse_env("TELEBRIDGE_WS_PORT", 9172),
            api_key: std::env::var("TELEBRIDGE_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
            launch_on_startup: parse_env_bool("TELEBRIDGE_LAUNCH_ON_STARTUP", false),
            event_bus_capacity: parse_env("TELEBRIDGE_EVENT_BUS_CAPACITY", 1024),
            auth_grace: Duration::from_millis(parse_env("TELEBRIDGE_AUTH_GRACE_MS", 5_000)),
            signal_idle_timeout: Duration::from_secs(parse_env(
                "TELEBRIDGE_SIGNAL_IDLE_TIMEOUT_SECS",
                30,
            )),
            shutdown_grace: Duration::from_millis(parse_env("TELEBRIDGE_SHUTDOWN_GRACE_MS", 3_000)),
        }
    }
}

/// Sending half of the settings channel; owned by the lifecycle controller.
pub type SettingsTx = watch::Sender<Arc<SettingsSnapshot>>;

/// Receiving half of the settings channel; every component that needs the
/// current snapshot holds one and reads it with `borrow()`.
pub type SettingsRx = watch::Receiver<Arc<SettingsSnapshot>>;

/// Creates the settings channel seeded with the given snapshot.
#[must_use]
pub fn settings_channel(initial: SettingsSnapshot) -> (SettingsTx, SettingsRx) {
    watch::channel(Arc::new(initial))
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. Accepts `"true"`, `"1"`,
/// `"false"`, `"0"` (case-insensitive). Returns `default` otherwise.
fn parse_env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key).ok().as_deref() {
        Some("true") | Some("TRUE") | Some("1") => true,
        Some("false") | Some("FALSE") | Some("0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn snapshot_with_key(key: Option<&str>) -> SettingsSnapshot {
        SettingsSnapshot {
            api_port: 0,
            ws_port: 0,
            api_key: key.map(str::to_string),
            launch_on_startup: false,
            event_bus_capacity: 64,
            auth_grace: Duration::from_millis(200),
            signal_idle_timeout: Duration::from_secs(1),
            shutdown_grace: Duration::from_millis(500),
        }
    }

    #[test]
    fn watch_replacement_is_wholesale() {
        let (tx, rx) = settings_channel(snapshot_with_key(Some("old")));
        assert_eq!(rx.borrow().api_key.as_deref(), Some("old"));

        let mut next = snapshot_with_key(Some("new"));
        next.api_port = 4242;
        let _ = tx.send(Arc::new(next));

        let current = rx.borrow();
        assert_eq!(current.api_key.as_deref(), Some("new"));
        assert_eq!(current.api_port, 4242);
    }
}
