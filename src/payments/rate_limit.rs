// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-operation rate limiting.
//!
//! The engine consults a [`RateLimiter`] before accepting work; the
//! default backend is an in-process fixed-window counter with
//! increment-and-expire semantics per `{operation}:{key}`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

/// Rate-limit decision seam.
pub trait RateLimiter: Send + Sync {
    /// True when the operation is allowed for `key`; counts the attempt.
    fn check(&self, operation: &str, key: &str) -> bool;
}

/// A limiter that always allows. Used where limiting is configured off.
pub struct NoopLimiter;

impl RateLimiter for NoopLimiter {
    fn check(&self, _operation: &str, _key: &str) -> bool {
        true
    }
}

/// Fixed-window counter limiter.
pub struct FixedWindowLimiter {
    /// operation → (max per window, window length)
    limits: HashMap<String, (u32, Duration)>,
    /// `{operation}:{key}` → (count, window start)
    windows: Mutex<HashMap<String, (u32, Instant)>>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self {
            limits: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Standard limits from configuration.
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new()
            .with_limit("transfer", config.transfer_per_minute, Duration::from_secs(60))
            .with_limit("otp", config.otp_per_hour, Duration::from_secs(3600))
    }

    pub fn with_limit(mut self, operation: &str, max: u32, window: Duration) -> Self {
        self.limits.insert(operation.to_string(), (max, window));
        self
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn check(&self, operation: &str, key: &str) -> bool {
        let Some((max, window)) = self.limits.get(operation).copied() else {
            // Unconfigured operations are unlimited.
            return true;
        };

        let entry_key = format!("{operation}:{key}");
        let Ok(mut windows) = self.windows.lock() else {
            return true;
        };

        let now = Instant::now();
        let entry = windows.entry(entry_key).or_insert((0, now));
        if now.duration_since(entry.1) >= window {
            *entry = (0, now);
        }

        if entry.0 >= max {
            return false;
        }
        entry.0 += 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_refuses() {
        let limiter =
            FixedWindowLimiter::new().with_limit("transfer", 3, Duration::from_secs(60));

        assert!(limiter.check("transfer", "user-1"));
        assert!(limiter.check("transfer", "user-1"));
        assert!(limiter.check("transfer", "user-1"));
        assert!(!limiter.check("transfer", "user-1"));

        // Other keys are independent
        assert!(limiter.check("transfer", "user-2"));
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let limiter =
            FixedWindowLimiter::new().with_limit("otp", 1, Duration::from_millis(10));

        assert!(limiter.check("otp", "+14155550101"));
        assert!(!limiter.check("otp", "+14155550101"));

        std::thread::sleep(Duration::from_millis(15));
        assert!(limiter.check("otp", "+14155550101"));
    }

    #[test]
    fn unconfigured_operations_are_unlimited() {
        let limiter = FixedWindowLimiter::new();
        for _ in 0..100 {
            assert!(limiter.check("anything", "key"));
        }
    }
}
