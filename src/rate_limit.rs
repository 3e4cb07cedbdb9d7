//! Fixed-window request limiter for chat sends.
//!
//! One bucket per key (the session id when the client sends one, otherwise
//! the caller address). Expired windows are pruned opportunistically.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub use crate::config::RateLimitConfig;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

#[derive(Debug)]
struct LimiterState {
    windows: HashMap<String, Window>,
    last_cleanup: Instant,
}

/// Rejection carrying how long until the caller's window resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("rate limit exceeded, retry after {}s", .retry_after.as_secs())]
pub struct RateLimitExceeded {
    pub retry_after: Duration,
}

impl RateLimitExceeded {
    /// Whole seconds, rounded up, for `Retry-After`.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        if self.retry_after.subsec_nanos() > 0 { secs + 1 } else { secs }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
        }
    }

    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Count a request against `key`.
    pub fn check(&self, key: &str) -> Result<(), RateLimitExceeded> {
        self.check_at(key, Instant::now())
    }

    /// Count a request against `key` as of `now`.
    ///
    /// A poisoned lock lets the request through; limiting is best effort.
    pub fn check_at(&self, key: &str, now: Instant) -> Result<(), RateLimitExceeded> {
        let Ok(mut state) = self.state.lock() else {
            return Ok(());
        };
        let window_len = self.config.window;

        if now.saturating_duration_since(state.last_cleanup) >= CLEANUP_INTERVAL {
            state
                .windows
                .retain(|_, w| now.saturating_duration_since(w.started) < window_len);
            state.last_cleanup = now;
        }

        let window = state.windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.saturating_duration_since(window.started) >= window_len {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.config.max_requests {
            let elapsed = now.saturating_duration_since(window.started);
            return Err(RateLimitExceeded {
                retry_after: window_len.saturating_sub(elapsed),
            });
        }
        window.count += 1;
        Ok(())
    }
}
