//! Fixed-window submission limiter keyed by client address.
//!
//! Entries live for the life of the process; nothing evicts them.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_REQUESTS: u32 = 5;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub remaining: u32,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW)
    }
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    pub fn record(&self, key: &str) {
        self.record_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get(key) {
            Some(entry) if !self.expired(entry, now) => {
                let remaining = self.max_requests.saturating_sub(entry.count);
                Decision {
                    allowed: entry.count < self.max_requests,
                    remaining,
                }
            }
            _ => Decision {
                allowed: true,
                remaining: self.max_requests,
            },
        }
    }

    pub fn record_at(&self, key: &str, now: Instant) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.get_mut(key) {
            Some(entry) if !self.expired(entry, now) => entry.count += 1,
            _ => {
                entries.insert(
                    key.to_owned(),
                    Window {
                        count: 1,
                        started: now,
                    },
                );
            }
        }
    }

    fn expired(&self, entry: &Window, now: Instant) -> bool {
        now.saturating_duration_since(entry.started) > self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_key_is_fresh() {
        let limiter = RateLimiter::default();

        assert_eq!(
            limiter.check("10.0.0.1"),
            Decision {
                allowed: true,
                remaining: 5
            }
        );
    }

    #[test]
    fn sixth_attempt_in_window_is_refused() {
        let limiter = RateLimiter::default();
        let start = Instant::now();

        for i in 0..5 {
            let decision = limiter.check_at("10.0.0.1", start);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 5 - i);
            limiter.record_at("10.0.0.1", start + Duration::from_secs(u64::from(i)));
        }

        assert_eq!(
            limiter.check_at("10.0.0.1", start + Duration::from_secs(60)),
            Decision {
                allowed: false,
                remaining: 0
            }
        );
    }

    #[test]
    fn window_elapsing_resets_capacity() {
        let limiter = RateLimiter::default();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.record_at("10.0.0.1", start);
        }

        let later = start + DEFAULT_WINDOW + Duration::from_secs(1);
        assert_eq!(
            limiter.check_at("10.0.0.1", later),
            Decision {
                allowed: true,
                remaining: 5
            }
        );

        limiter.record_at("10.0.0.1", later);
        assert_eq!(limiter.check_at("10.0.0.1", later).remaining, 4);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        limiter.record_at("k", start);

        assert!(!limiter.check_at("k", start + Duration::from_secs(10)).allowed);
        assert!(limiter.check_at("k", start + Duration::from_secs(11)).allowed);
    }

    #[test]
    fn keys_are_tracked_independently() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let now = Instant::now();
        limiter.record_at("a", now);

        assert!(!limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
    }
}
