//! Per-key request log for the sliding window.

use serde::{Deserialize, Serialize};

/// Accepted request timestamps for one (endpoint, client) key.
///
/// Timestamps are epoch milliseconds in arrival order. Only requests that
/// were admitted are recorded, so a rejected check never grows the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitEntry {
    /// Timestamps of admitted requests still inside some window
    requests: Vec<u64>,
    /// Reset time computed by the most recent check
    reset_at: u64,
    /// Window length used by the most recent check
    window_ms: u64,
}

impl RateLimitEntry {
    /// Create an empty entry for the given window.
    pub fn new(window_ms: u64) -> Self {
        Self {
            requests: Vec::new(),
            reset_at: 0,
            window_ms,
        }
    }

    /// Drop every timestamp that is no longer inside `window_ms` of `now`.
    ///
    /// A timestamp `t` survives when `t > now - window_ms`. The comparison is
    /// done as `t + window_ms > now` so early clocks never underflow.
    pub fn prune(&mut self, now: u64, window_ms: u64) {
        self.window_ms = window_ms;
        self.requests.retain(|&t| t.saturating_add(window_ms) > now);
    }

    /// Record an admitted request.
    pub fn record(&mut self, now: u64) {
        self.requests.push(now);
    }

    /// Number of recorded requests.
    pub fn count(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Oldest surviving timestamp, if any.
    pub fn oldest(&self) -> Option<u64> {
        self.requests.iter().copied().min()
    }

    pub fn requests(&self) -> &[u64] {
        &self.requests
    }

    pub fn reset_at(&self) -> u64 {
        self.reset_at
    }

    pub(crate) fn set_reset_at(&mut self, reset_at: u64) {
        self.reset_at = reset_at;
    }

    /// Window length the entry was last checked against.
    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_is_empty() {
        let entry = RateLimitEntry::new(1_000);
        assert!(entry.is_empty());
        assert_eq!(entry.count(), 0);
        assert_eq!(entry.oldest(), None);
        assert_eq!(entry.window_ms(), 1_000);
    }

    #[test]
    fn test_prune_drops_expired_timestamps() {
        let mut entry = RateLimitEntry::new(1_000);
        entry.record(0);
        entry.record(500);
        entry.record(900);

        // 0 is exactly one window old at t=1000 and must go
        entry.prune(1_000, 1_000);
        assert_eq!(entry.requests(), &[500, 900]);

        entry.prune(1_501, 1_000);
        assert_eq!(entry.requests(), &[900]);
    }

    #[test]
    fn test_prune_keeps_early_timestamps_without_underflow() {
        let mut entry = RateLimitEntry::new(1_000);
        entry.record(0);

        entry.prune(500, 1_000);
        assert_eq!(entry.count(), 1);
    }

    #[test]
    fn test_prune_updates_window() {
        let mut entry = RateLimitEntry::new(1_000);
        entry.record(10);

        entry.prune(20, 60_000);
        assert_eq!(entry.window_ms(), 60_000);
        assert_eq!(entry.count(), 1);
    }

    #[test]
    fn test_oldest_tolerates_out_of_order_records() {
        let mut entry = RateLimitEntry::new(1_000);
        entry.record(300);
        entry.record(100);
        entry.record(200);

        assert_eq!(entry.oldest(), Some(100));
    }

    #[test]
    fn test_entry_serializes_camel_case() {
        let mut entry = RateLimitEntry::new(60_000);
        entry.record(42);
        entry.set_reset_at(60_042);

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["requests"], serde_json::json!([42]));
        assert_eq!(json["resetAt"], 60_042);
        assert_eq!(json["windowMs"], 60_000);
    }
}
