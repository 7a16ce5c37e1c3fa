#![cfg(feature = "std")]

//! Runtime tuning for the sync engine and remote links.
//!
//! Game rules are compile-time constants in [`crate::core::config`].

use std::time::Duration;

/// Intervals, channel sizes and retry policy for a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Cadence of the status loop while the match is running.
    pub status_interval: Duration,
    /// Cadence of the snapshot loop.
    pub snapshot_interval: Duration,
    /// Cadence of status polls while waiting for the match to start.
    pub start_poll_interval: Duration,
    /// Capacity of the bounded status and snapshot feeds.
    pub feed_capacity: usize,
    /// Back off the status loop after consecutive rate-limit failures.
    pub rate_limit_backoff: bool,
    /// Upper bound on ticks skipped by one backoff.
    pub max_backoff_ticks: u32,
    /// Timeout applied to each call over a network link.
    pub remote_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(500),
            snapshot_interval: Duration::from_millis(100),
            start_poll_interval: Duration::from_millis(500),
            feed_capacity: 16,
            rate_limit_backoff: true,
            max_backoff_ticks: 8,
            remote_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = interval;
        self
    }

    pub fn with_start_poll_interval(mut self, interval: Duration) -> Self {
        self.start_poll_interval = interval;
        self
    }

    /// Capacity is clamped to at least one; tokio rejects empty channels.
    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity.max(1);
        self
    }

    pub fn with_rate_limit_backoff(mut self, enabled: bool) -> Self {
        self.rate_limit_backoff = enabled;
        self
    }

    pub fn with_max_backoff_ticks(mut self, ticks: u32) -> Self {
        self.max_backoff_ticks = ticks;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Ticks to skip after the `failures`-th consecutive rate-limit error.
    ///
    /// Doubles from one, capped at `max_backoff_ticks`; zero when backoff is
    /// disabled or nothing has failed.
    pub fn backoff_ticks(&self, failures: u32) -> u32 {
        if !self.rate_limit_backoff || failures == 0 {
            return 0;
        }
        let exp = (failures - 1).min(31);
        (1u32 << exp).min(self.max_backoff_ticks)
    }
}
