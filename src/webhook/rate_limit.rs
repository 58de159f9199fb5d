//! Sliding-window rate limiting per (provider, client IP).
//!
//! State is process-local; under multi-instance deployment this degrades to
//! per-instance limiting. Callers needing a global bound must externalize
//! the window store.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::Provider;

pub struct SlidingWindowLimiter {
    window: Duration,
    windows: Mutex<HashMap<(Provider, String), VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Records one request and reports whether it fits under `ceiling`.
    ///
    /// Rejected requests are not recorded, so a flood of rejections does
    /// not extend the lockout past the window.
    pub fn check(&self, provider: Provider, client_ip: &str, ceiling: u32) -> bool {
        self.check_at(provider, client_ip, ceiling, Instant::now())
    }

    fn check_at(&self, provider: Provider, client_ip: &str, ceiling: u32, now: Instant) -> bool {
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        let entries = windows
            .entry((provider, client_ip.to_string()))
            .or_default();

        while let Some(front) = entries.front() {
            if now.duration_since(*front) >= self.window {
                entries.pop_front();
            } else {
                break;
            }
        }

        if entries.len() as u32 >= ceiling {
            return false;
        }
        entries.push_back(now);
        true
    }

    /// Drops fully-expired windows. Called opportunistically so idle
    /// (provider, IP) pairs do not accumulate forever.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().expect("rate limiter lock poisoned");
        windows.retain(|_, entries| {
            entries
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_rejects_request_over_limit() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        let now = Instant::now();

        for _ in 0..5 {
            assert!(limiter.check_at(Provider::Zoom, "203.0.113.1", 5, now));
        }
        assert!(!limiter.check_at(Provider::Zoom, "203.0.113.1", 5, now));
    }

    #[test]
    fn test_window_recovers_after_elapsing() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at(Provider::Google, "203.0.113.1", 3, start));
        }
        assert!(!limiter.check_at(Provider::Google, "203.0.113.1", 3, start));

        let later = start + Duration::from_secs(61);
        assert!(limiter.check_at(Provider::Google, "203.0.113.1", 3, later));
    }

    #[test]
    fn test_windows_are_scoped_per_provider_and_ip() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.check_at(Provider::Zoom, "203.0.113.1", 1, now));
        assert!(!limiter.check_at(Provider::Zoom, "203.0.113.1", 1, now));
        // Different IP, fresh window.
        assert!(limiter.check_at(Provider::Zoom, "203.0.113.2", 1, now));
        // Different provider, fresh window.
        assert!(limiter.check_at(Provider::Microsoft, "203.0.113.1", 1, now));
    }

    #[test]
    fn test_rejections_do_not_extend_the_window() {
        let limiter = SlidingWindowLimiter::new(Duration::from_secs(60));
        let start = Instant::now();

        assert!(limiter.check_at(Provider::Zoom, "203.0.113.1", 1, start));
        // Hammering while limited leaves only the original entry behind.
        for i in 1..10 {
            let t = start + Duration::from_secs(i);
            assert!(!limiter.check_at(Provider::Zoom, "203.0.113.1", 1, t));
        }
        let after_window = start + Duration::from_secs(60);
        assert!(limiter.check_at(Provider::Zoom, "203.0.113.1", 1, after_window));
    }
}
