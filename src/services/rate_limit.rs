//! Fixed-window rate limiter.
//!
//! One counter per identifier (IP or API key). The window is fixed, not
//! sliding, so a burst straddling a boundary can see up to 2x the budget;
//! accepted tradeoff for simplicity. Entries are advisory, in-memory only,
//! and swept periodically once expired.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
struct RateLimitEntry {
    count: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after_ms: i64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    /// Count one request against the identifier's current window.
    pub fn check(&self, identifier: &str) -> Decision {
        let now = Utc::now();
        let window = Duration::milliseconds(self.config.window_ms);
        let mut entry = self
            .entries
            .entry(identifier.to_string())
            .or_insert(RateLimitEntry {
                count: 0,
                reset_at: now + window,
            });

        if now >= entry.reset_at {
            entry.count = 1;
            entry.reset_at = now + window;
            return Decision::Allowed {
                remaining: self.config.max_requests.saturating_sub(1),
            };
        }

        entry.count += 1;
        if entry.count > self.config.max_requests {
            Decision::Limited {
                retry_after_ms: (entry.reset_at - now).num_milliseconds().max(1),
            }
        } else {
            Decision::Allowed {
                remaining: self.config.max_requests - entry.count,
            }
        }
    }

    /// Drop every entry whose window has elapsed. Returns how many were
    /// removed; driven by the server's background interval task.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.reset_at > now);
        before - self.entries.len()
    }

    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(window_ms: i64, max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window_ms,
            max_requests,
        })
    }

    #[test]
    fn exactly_n_requests_pass_per_window() {
        let rl = limiter(60_000, 3);
        for i in 0..3 {
            assert!(rl.check("ip1").is_allowed(), "request {i} should pass");
        }
        match rl.check("ip1") {
            Decision::Limited { retry_after_ms } => assert!(retry_after_ms > 0),
            other => panic!("expected Limited, got {other:?}"),
        }
    }

    #[test]
    fn identifiers_are_independent() {
        let rl = limiter(60_000, 1);
        assert!(rl.check("a").is_allowed());
        assert!(!rl.check("a").is_allowed());
        assert!(rl.check("b").is_allowed());
    }

    #[test]
    fn window_elapse_resets_counter() {
        let rl = limiter(30, 2);
        assert!(rl.check("x").is_allowed());
        assert!(rl.check("x").is_allowed());
        assert!(!rl.check("x").is_allowed());
        std::thread::sleep(std::time::Duration::from_millis(40));
        assert!(rl.check("x").is_allowed());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let rl = limiter(30, 5);
        rl.check("old");
        std::thread::sleep(std::time::Duration::from_millis(40));
        rl.check("fresh");
        let removed = rl.sweep();
        assert_eq!(removed, 1);
        assert_eq!(rl.tracked(), 1);
    }
}
