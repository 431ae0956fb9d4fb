// Login rate limiting
// Decision: Sliding-window log per client key; every login attempt counts whether it
// succeeds or not
// Decision: Rejected attempts are not logged, so a client regains one attempt each
// time its oldest logged attempt leaves the window

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::config::LoginRateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: usize },
    Limited { retry_after: Duration },
}

/// Per-key sliding window of attempt timestamps
#[derive(Clone)]
pub struct LoginRateLimiter {
    config: LoginRateLimitConfig,
    state: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

impl LoginRateLimiter {
    pub fn new(config: LoginRateLimitConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register an attempt for `key` now
    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut state = self.state.lock();
        let attempts = state.entry(key.to_string()).or_default();

        while let Some(oldest) = attempts.front() {
            if now.saturating_duration_since(*oldest) >= self.config.window {
                attempts.pop_front();
            } else {
                break;
            }
        }

        if attempts.len() >= self.config.max_attempts {
            let retry_after = attempts
                .front()
                .map(|oldest| {
                    self.config
                        .window
                        .saturating_sub(now.saturating_duration_since(*oldest))
                })
                .unwrap_or(self.config.window);
            return RateLimitDecision::Limited { retry_after };
        }

        attempts.push_back(now);
        RateLimitDecision::Allowed {
            remaining: self.config.max_attempts - attempts.len(),
        }
    }

    /// Drop keys with no attempts inside the window (call from a background task)
    pub fn cleanup(&self) {
        self.cleanup_at(Instant::now());
    }

    fn cleanup_at(&self, now: Instant) {
        let window = self.config.window;
        self.state.lock().retain(|_, attempts| {
            attempts
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < window)
        });
    }

    pub fn tracked_keys(&self) -> usize {
        self.state.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> LoginRateLimiter {
        LoginRateLimiter::new(LoginRateLimitConfig {
            max_attempts: 5,
            window: Duration::from_secs(300),
        })
    }

    #[test]
    fn test_sixth_attempt_is_limited() {
        let limiter = limiter();
        let start = Instant::now();

        for i in 0..5 {
            assert_eq!(
                limiter.check_at("10.0.0.1", start + Duration::from_secs(i)),
                RateLimitDecision::Allowed {
                    remaining: 4 - i as usize
                }
            );
        }

        match limiter.check_at("10.0.0.1", start + Duration::from_secs(10)) {
            RateLimitDecision::Limited { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(290));
            }
            other => panic!("expected limit, got {other:?}"),
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at("10.0.0.1", now);
        }

        assert!(matches!(
            limiter.check_at("10.0.0.2", now),
            RateLimitDecision::Allowed { .. }
        ));
    }

    #[test]
    fn test_window_slides() {
        let limiter = limiter();
        let start = Instant::now();
        for i in 0..5 {
            limiter.check_at("ip", start + Duration::from_secs(i * 10));
        }
        assert!(matches!(
            limiter.check_at("ip", start + Duration::from_secs(299)),
            RateLimitDecision::Limited { .. }
        ));

        // First attempt leaves the window at t=300
        assert!(matches!(
            limiter.check_at("ip", start + Duration::from_secs(300)),
            RateLimitDecision::Allowed { remaining: 0 }
        ));
        assert!(matches!(
            limiter.check_at("ip", start + Duration::from_secs(301)),
            RateLimitDecision::Limited { .. }
        ));
    }

    #[test]
    fn test_cleanup_drops_idle_keys() {
        let limiter = limiter();
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::from_secs(200));

        limiter.cleanup_at(start + Duration::from_secs(400));
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
