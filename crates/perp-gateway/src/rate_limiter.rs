//! Sliding-window rate limiting for gateway calls.
//!
//! Keeps the timestamps of recent calls and makes callers wait until the
//! oldest one leaves the window.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// Sliding-window rate limiter.
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum calls per window.
    max_calls: u32,
    window: Duration,
    /// Timestamps of recent calls.
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_calls as usize)),
        }
    }

    /// Limiter allowing `max_calls` per second.
    pub fn per_second(max_calls: u32) -> Self {
        Self::new(max_calls, Duration::from_secs(1))
    }

    /// Record a call if capacity is available.
    pub fn try_acquire(&self) -> bool {
        self.reserve().is_none()
    }

    /// Wait until a call is allowed, then record it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.reserve() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// Current call count in the window.
    pub fn current_count(&self) -> u32 {
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window);
        timestamps.len() as u32
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.max_calls.saturating_sub(self.current_count())
    }

    pub fn reset(&self) {
        self.timestamps.lock().clear();
    }

    /// Record a call now, or return how long until capacity frees up.
    fn reserve(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock();
        Self::cleanup(&mut timestamps, self.window);

        if timestamps.len() < self.max_calls as usize {
            timestamps.push_back(now);
            return None;
        }

        let oldest = timestamps.front().copied().unwrap_or(now);
        let wait = (oldest + self.window).saturating_duration_since(now);
        Some(wait.max(Duration::from_millis(1)))
    }

    fn cleanup(timestamps: &mut VecDeque<Instant>, window: Duration) {
        let now = Instant::now();
        while timestamps
            .front()
            .is_some_and(|&t| now.duration_since(t) >= window)
        {
            timestamps.pop_front();
        }
    }
}
