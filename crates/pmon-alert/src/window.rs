use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

struct Breach {
    since: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

/// Tracks, per observed series, since when a rule's condition has held
/// without interruption.
///
/// Only a non-breaching observation clears a key. Observations may arrive
/// further apart than the required duration; the breach is still counted
/// from the first breaching observation.
#[derive(Default)]
pub struct BreachWindow {
    breaches: HashMap<String, Breach>,
}

impl BreachWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an observation for `key` and reports whether the condition
    /// has now held for at least `duration`. A zero duration is satisfied
    /// by the first breaching observation.
    pub fn observe(&mut self, key: &str, breached: bool, duration: Duration, now: DateTime<Utc>) -> bool {
        if !breached {
            self.breaches.remove(key);
            return false;
        }
        if duration <= Duration::zero() {
            self.breaches.remove(key);
            return true;
        }

        let breach = self
            .breaches
            .entry(key.to_string())
            .or_insert(Breach { since: now, last_seen: now });
        breach.last_seen = now;
        now - breach.since >= duration
    }

    /// Start of the current uninterrupted breach for `key`.
    pub fn since(&self, key: &str) -> Option<DateTime<Utc>> {
        self.breaches.get(key).map(|b| b.since)
    }

    /// Drops every key belonging to `rule`.
    pub fn clear_rule(&mut self, rule: &str) {
        let prefix = format!("{rule}:");
        self.breaches.retain(|key, _| !key.starts_with(&prefix));
    }

    /// Drops keys not observed within `max_idle` before `now`.
    pub fn evict(&mut self, now: DateTime<Utc>, max_idle: Duration) {
        let cutoff = now - max_idle;
        self.breaches.retain(|_, b| b.last_seen >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.breaches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_must_hold_for_duration() {
        let mut window = BreachWindow::new();
        let t0 = Utc::now();
        let five = Duration::minutes(5);

        assert!(!window.observe("cpu:api", true, five, t0));
        assert!(!window.observe("cpu:api", true, five, t0 + Duration::minutes(3)));
        assert!(window.observe("cpu:api", true, five, t0 + Duration::minutes(5)));
        assert_eq!(window.since("cpu:api"), Some(t0));
    }

    #[test]
    fn recovery_resets_the_window() {
        let mut window = BreachWindow::new();
        let t0 = Utc::now();
        let five = Duration::minutes(5);

        window.observe("cpu:api", true, five, t0);
        window.observe("cpu:api", false, five, t0 + Duration::minutes(2));
        assert!(window.since("cpu:api").is_none());
        assert!(!window.observe("cpu:api", true, five, t0 + Duration::minutes(6)));
        assert_eq!(window.since("cpu:api"), Some(t0 + Duration::minutes(6)));
    }

    #[test]
    fn sparse_observations_still_satisfy_a_short_duration() {
        let mut window = BreachWindow::new();
        let t0 = Utc::now();
        let two = Duration::minutes(2);

        assert!(!window.observe("cpu:api", true, two, t0));
        assert!(window.observe("cpu:api", true, two, t0 + Duration::minutes(5)));
        assert_eq!(window.since("cpu:api"), Some(t0));
    }

    #[test]
    fn zero_duration_is_immediate_and_keys_clear_per_rule() {
        let mut window = BreachWindow::new();
        let t0 = Utc::now();
        assert!(window.observe("cpu:api", true, Duration::zero(), t0));
        assert!(window.is_empty());

        window.observe("cpu:api", true, Duration::minutes(5), t0);
        window.observe("cpu:web", true, Duration::minutes(5), t0);
        window.observe("mem:api", true, Duration::minutes(5), t0);
        window.clear_rule("cpu");
        assert_eq!(window.len(), 1);

        window.evict(t0 + Duration::hours(2), Duration::hours(1));
        assert!(window.is_empty());
    }
}
