// src/services/rate_limiter.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::warn;

use crate::models::RateWindow;
use crate::store::Store;

/// Sliding-window rate limiter backed by the store, so the counters survive
/// a process restart along with everything else.
pub struct RateLimiter {
    store: Arc<Store>,
}

impl RateLimiter {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record a hit for `(scope, key)` and report whether it stays within
    /// `limit` hits per `window`. Pruning and the hit append happen under the
    /// document lock, so concurrent callers cannot both sneak past the limit.
    pub fn allow(&self, scope: &str, key: &str, limit: u32, window: Duration) -> bool {
        let now = Utc::now();
        let floor = now - window;
        let id = format!("{}:{}", scope, key);

        let allowed = self.store.rate_windows.mutate(&id, RateWindow::default, |w| {
            w.hits.retain(|t| *t >= floor);
            if w.hits.len() >= limit as usize {
                return false;
            }
            w.hits.push(now);
            true
        });

        if !allowed {
            warn!("Rate limit hit for {} ({} per {}s)", id, limit, window.num_seconds());
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_within_the_limit_are_allowed() {
        let limiter = RateLimiter::new(Arc::new(Store::new()));
        for _ in 0..3 {
            assert!(limiter.allow("test", "u1", 3, Duration::minutes(1)));
        }
        assert!(!limiter.allow("test", "u1", 3, Duration::minutes(1)));
    }

    #[test]
    fn keys_are_isolated() {
        let limiter = RateLimiter::new(Arc::new(Store::new()));
        assert!(limiter.allow("test", "u1", 1, Duration::minutes(1)));
        assert!(!limiter.allow("test", "u1", 1, Duration::minutes(1)));
        assert!(limiter.allow("test", "u2", 1, Duration::minutes(1)));
        assert!(limiter.allow("other", "u1", 1, Duration::minutes(1)));
    }
}
