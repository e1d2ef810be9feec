//! Fixed-window attempt limiting for access validation.
//!
//! One counter per client identifier (normally the client IP). The first
//! attempt opens a window of `window` length; attempts beyond
//! `max_attempts` inside that window are refused until it closes.
//!
//! The limiter is process-local. Several instances behind a load balancer
//! each keep their own counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;
use crate::observability::metrics;

/// Counter state for one identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_time: DateTime<Utc>,
}

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Whole seconds until the window closes, never less than one.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        let millis = (self.reset_time - now).num_milliseconds().max(0) as u64;
        millis.div_ceil(1000).max(1)
    }
}

/// In-memory fixed-window rate limiter.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

struct RateLimiterInner {
    max_attempts: u32,
    window: chrono::Duration,
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                max_attempts,
                window: chrono::Duration::from_std(window)
                    .unwrap_or_else(|_| chrono::Duration::days(365)),
                entries: DashMap::new(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_secs(config.window_secs))
    }

    /// Record an attempt for `identifier` at the current time.
    pub fn check(&self, identifier: &str) -> RateLimitDecision {
        self.check_at(identifier, Utc::now())
    }

    /// Record an attempt for `identifier` at `now`.
    pub fn check_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let max = self.inner.max_attempts;
        let mut entry = self
            .inner
            .entries
            .entry(identifier.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_time: now,
            });

        // A fresh entry has count 0 and is treated like an expired one.
        if entry.count == 0 || now > entry.reset_time {
            entry.count = 1;
            entry.reset_time = now + self.inner.window;
            return RateLimitDecision {
                allowed: true,
                remaining: max.saturating_sub(1),
                reset_time: entry.reset_time,
            };
        }

        if entry.count >= max {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                reset_time: entry.reset_time,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: max - entry.count,
            reset_time: entry.reset_time,
        }
    }

    /// Drop every entry whose window closed before `now`.
    ///
    /// Returns the number of removed entries.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, e| e.reset_time >= now);
        let removed = before.saturating_sub(self.inner.entries.len());
        metrics::record_rate_limit_entries(self.inner.entries.len());
        removed
    }

    /// Current counter for `identifier`, if one is tracked.
    pub fn entry(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.inner.entries.get(identifier).map(|e| *e.value())
    }

    /// Number of tracked identifiers.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Periodically sweep expired entries until shutdown is signalled.
    pub async fn run_sweeper(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(interval_secs = interval.as_secs(), "Rate limit sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_expired(Utc::now());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "Swept expired rate limit entries");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        tracing::info!("Rate limit sweeper stopped");
    }
}
