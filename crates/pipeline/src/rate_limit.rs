//! Fixed-window ingestion rate limiter.
//!
//! One counter per caller identity in the shared store, so the quota
//! holds across process instances. The window is anchored at the
//! caller's first request and the counter expires with it; after the
//! boundary, calls succeed again.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PipelineError;
use crate::store::SharedStore;

/// Default quota: 5 submissions per window.
const DEFAULT_QUOTA: i64 = 5;

/// Default window: 30 minutes.
const DEFAULT_WINDOW: Duration = Duration::from_secs(30 * 60);

/// Bounds ingestion call frequency per caller identity.
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    quota: i64,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, quota: i64, window: Duration) -> Self {
        Self {
            store,
            quota,
            window,
        }
    }

    /// Limiter with the default quota and window.
    pub fn with_defaults(store: Arc<dyn SharedStore>) -> Self {
        Self::new(store, DEFAULT_QUOTA, DEFAULT_WINDOW)
    }

    /// Count one call for `caller`; error once the quota is exhausted.
    pub async fn check(&self, caller: &str) -> Result<(), PipelineError> {
        let key = format!("ratelimit:{caller}");
        let count = self.store.incr_with_expiry(&key, self.window).await?;

        if count > self.quota {
            tracing::debug!(caller, count, quota = self.quota, "Rate limit exceeded");
            return Err(PipelineError::RateLimited(caller.to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn quota_allows_n_and_rejects_the_next() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 3, Duration::from_secs(60));

        for _ in 0..3 {
            limiter.check("patient:1").await.unwrap();
        }
        let err = limiter.check("patient:1").await.unwrap_err();
        assert_matches!(err, PipelineError::RateLimited(_));
    }

    #[tokio::test]
    async fn callers_have_independent_windows() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 1, Duration::from_secs(60));

        limiter.check("patient:1").await.unwrap();
        limiter.check("patient:2").await.unwrap();
        assert!(limiter.check("patient:1").await.is_err());
    }

    #[tokio::test]
    async fn window_rollover_resets_the_quota() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()), 2, Duration::from_millis(30));

        limiter.check("patient:1").await.unwrap();
        limiter.check("patient:1").await.unwrap();
        assert!(limiter.check("patient:1").await.is_err());

        tokio::time::sleep(Duration::from_millis(60)).await;
        limiter.check("patient:1").await.unwrap();
    }
}
