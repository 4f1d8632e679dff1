//! Per-connection subscription set.
//!
//! Tracks which event names a connection is subscribed to and provides
//! server-side event filtering. A pattern is either an exact event name
//! or the wildcard `"*"` meaning "all events".

use std::collections::HashSet;

/// The set of event-name subscriptions held by one connection.
///
/// Subscribe and unsubscribe are idempotent (set semantics).
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    /// Explicitly subscribed event names. Ignored while `all` is set.
    names: HashSet<String>,
    /// Whether the wildcard `"*"` subscription is active.
    all: bool,
}

/// The wildcard pattern matching every event name.
pub const WILDCARD: &str = "*";

impl SubscriptionSet {
    /// Creates an empty subscription set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pattern. `"*"` enables the wildcard.
    pub fn subscribe(&mut self, pattern: &str) {
        if pattern == WILDCARD {
            self.all = true;
        } else {
            self.names.insert(pattern.to_string());
        }
    }

    /// Removes a pattern. `"*"` disables the wildcard only; explicit
    /// names previously subscribed remain in effect.
    pub fn unsubscribe(&mut self, pattern: &str) {
        if pattern == WILDCARD {
            self.all = false;
        } else {
            self.names.remove(pattern);
        }
    }

    /// Returns `true` if the given event name matches this set.
    #[must_use]
    pub fn matches(&self, event_name: &str) -> bool {
        self.all || self.names.contains(event_name)
    }

    /// Returns the number of explicitly subscribed names.
    #[must_use]
    pub fn count(&self) -> usize {
        self.names.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let set = SubscriptionSet::new();
        assert!(!set.matches("cpu.load"));
    }

    #[test]
    fn subscribe_exact_name() {
        let mut set = SubscriptionSet::new();
        set.subscribe("cpu.load");
        assert!(set.matches("cpu.load"));
        assert!(!set.matches("memory.used"));
    }

    #[test]
    fn wildcard_matches_everything() {
        let mut set = SubscriptionSet::new();
        set.subscribe(WILDCARD);
        assert!(set.matches("cpu.load"));
        assert!(set.matches("battery.percentage"));
    }

    #[test]
    fn subscribe_is_idempotent() {
        let mut set = SubscriptionSet::new();
        set.subscribe("cpu.load");
        set.subscribe("cpu.load");
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn unsubscribe_removes_name() {
        let mut set = SubscriptionSet::new();
        set.subscribe("cpu.load");
        set.unsubscribe("cpu.load");
        assert!(!set.matches("cpu.load"));
    }

    #[test]
    fn unsubscribe_wildcard_keeps_explicit_names() {
        let mut set = SubscriptionSet::new();
        set.subscribe("cpu.load");
        set.subscribe(WILDCARD);
        set.unsubscribe(WILDCARD);
        assert!(set.matches("cpu.load"));
        assert!(!set.matches("memory.used"));
    }
}
