//! Core sliding-window rate limiter.

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use super::entry::RateLimitEntry;
use super::key::LimitKey;
use super::presets::{PresetTable, RateLimitPreset};

/// Interval between two cleanup sweeps.
pub const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Current wall-clock time in epoch milliseconds.
pub fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Requests left in the current window
    pub remaining: u32,
    /// Epoch millis when the window has room again
    pub reset_at: u64,
    /// Message for rejected requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RateLimitResult {
    /// Seconds until `reset_at`, rounded up.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now).div_ceil(1000)
    }
}

/// The sliding-window rate limiter.
///
/// Each (endpoint, client) pair owns an independent log of admitted request
/// timestamps. The store is sharded, and a check holds its key's shard for
/// the whole prune/decide/append step, so concurrent checks on one key are
/// serialized. Limits are per process.
pub struct RateLimiter {
    /// Request logs indexed by composite key
    store: DashMap<LimitKey, RateLimitEntry>,
    /// Effective preset table
    presets: RwLock<PresetTable>,
    /// Minimum time between cleanup sweeps
    cleanup_interval_ms: u64,
    /// Time of the last sweep, epoch millis
    last_cleanup: AtomicU64,
}

impl RateLimiter {
    /// Create a new rate limiter with the built-in presets.
    pub fn new() -> Self {
        Self::with_presets(PresetTable::builtin())
    }

    /// Create a new rate limiter with the given preset table.
    pub fn with_presets(presets: PresetTable) -> Self {
        Self {
            store: DashMap::new(),
            presets: RwLock::new(presets),
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            last_cleanup: AtomicU64::new(0),
        }
    }

    /// Set the minimum time between lazy cleanup sweeps.
    pub fn with_cleanup_interval(mut self, interval_ms: u64) -> Self {
        self.cleanup_interval_ms = interval_ms;
        self
    }

    /// Replace the preset table.
    pub fn set_presets(&self, presets: PresetTable) {
        *self.presets.write() = presets;
    }

    /// Get a copy of the current preset table.
    pub fn presets(&self) -> PresetTable {
        self.presets.read().clone()
    }

    /// Resolve a preset by name; unknown names give the default preset.
    pub fn preset(&self, name: &str) -> RateLimitPreset {
        self.presets.read().get(name)
    }

    /// Check and, if admitted, record one request.
    ///
    /// Stale timestamps are pruned first. When `max_requests` admitted
    /// requests already fall inside the window the call is rejected and the
    /// entry is left unchanged.
    pub fn check_rate_limit(
        &self,
        client: &str,
        endpoint: &str,
        max_requests: u32,
        window_ms: u64,
        now: u64,
    ) -> RateLimitResult {
        self.maybe_cleanup(now);

        let key = LimitKey::new(endpoint, client);

        trace!(
            key = %key,
            max_requests = max_requests,
            window_ms = window_ms,
            "Checking rate limit"
        );

        let mut entry = self
            .store
            .entry(key)
            .or_insert_with(|| RateLimitEntry::new(window_ms));

        entry.prune(now, window_ms);

        if entry.count() >= max_requests as usize {
            let reset_at = entry.oldest().unwrap_or(now).saturating_add(window_ms);
            entry.set_reset_at(reset_at);

            let retry_after = reset_at.saturating_sub(now).div_ceil(1000);
            debug!(
                key = %entry.key(),
                count = entry.count(),
                retry_after_secs = retry_after,
                "Rate limit exceeded"
            );

            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_at,
                error: Some(format!(
                    "Rate limit exceeded. Try again in {} seconds.",
                    retry_after
                )),
            };
        }

        entry.record(now);
        let reset_at = now.saturating_add(window_ms);
        entry.set_reset_at(reset_at);

        let remaining = max_requests.saturating_sub(entry.count() as u32);

        RateLimitResult {
            allowed: true,
            remaining,
            reset_at,
            error: None,
        }
    }

    /// Check against an explicit preset.
    pub fn check(
        &self,
        client: &str,
        endpoint: &str,
        preset: &RateLimitPreset,
        now: u64,
    ) -> RateLimitResult {
        self.check_rate_limit(client, endpoint, preset.max_requests, preset.window_ms, now)
    }

    /// Check against a named preset from this limiter's table.
    pub fn check_preset(
        &self,
        client: &str,
        endpoint: &str,
        preset: &str,
        now: u64,
    ) -> RateLimitResult {
        let preset = self.preset(preset);
        self.check(client, endpoint, &preset, now)
    }

    /// Check against a named preset at the current wall-clock time.
    pub fn check_now(&self, client: &str, endpoint: &str, preset: &str) -> RateLimitResult {
        self.check_preset(client, endpoint, preset, now_millis())
    }

    /// Run a sweep if the cleanup interval has elapsed.
    ///
    /// Only one caller wins the sweep when several race past the interval.
    fn maybe_cleanup(&self, now: u64) {
        let last = self.last_cleanup.load(Ordering::Acquire);
        if now.saturating_sub(last) <= self.cleanup_interval_ms {
            return;
        }
        if self
            .last_cleanup
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.cleanup(now);
        }
    }

    /// Remove every entry that has no timestamp left inside its window.
    ///
    /// Each entry is pruned against the window of its last check, so an
    /// entry with a live timestamp is never removed. Returns the number of
    /// removed entries.
    pub fn cleanup(&self, now: u64) -> usize {
        let mut removed = 0;
        self.store.retain(|_, entry| {
            let window_ms = entry.window_ms();
            entry.prune(now, window_ms);
            let live = !entry.is_empty();
            if !live {
                removed += 1;
            }
            live
        });

        debug!(
            removed = removed,
            remaining = self.store.len(),
            "Rate limit cleanup sweep finished"
        );

        removed
    }

    /// Remove the entry for a key. Returns whether one existed.
    pub fn reset_rate_limit(&self, endpoint: &str, client: &str) -> bool {
        self.store.remove(&LimitKey::new(endpoint, client)).is_some()
    }

    /// Get a snapshot of the entry for a key without touching it.
    pub fn get_rate_limit_status(&self, endpoint: &str, client: &str) -> Option<RateLimitEntry> {
        self.store
            .get(&LimitKey::new(endpoint, client))
            .map(|entry| entry.value().clone())
    }

    /// Clear all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.store.clear();
    }

    /// Get the number of tracked keys.
    pub fn entry_count(&self) -> usize {
        self.store.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
