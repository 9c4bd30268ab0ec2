use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;

/// Fixed-window counter per `(class, ip)` kept in the cache tier.
pub struct CacheRateLimiter {
    cache: Arc<dyn TokenCache>,
}

impl CacheRateLimiter {
    pub fn new(cache: Arc<dyn TokenCache>) -> Self {
        CacheRateLimiter { cache }
    }
}

#[async_trait::async_trait]
impl RateLimiter for CacheRateLimiter {
    async fn check(&self, class: LimitClass, ip: &str) -> Result<(), AuthError> {
        let policy = class.policy();
        let key = cache_key::rate_limit(class, ip);

        let count = match self.cache.incr_window_counter(&key, policy.window).await {
            Ok(count) => count,
            Err(e) => {
                warn!(%class, ip, error = %e, "rate limit counter unavailable, allowing request");
                return Ok(());
            }
        };

        if count > policy.max {
            debug!(%class, ip, count, "rate limit exceeded");
            return Err(AuthError::RateLimited {
                max: policy.max,
                window: policy.window,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn fixture() -> (Arc<ManualClock>, Arc<MemoryTokenCache>, CacheRateLimiter) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap(),
        ));
        let cache = Arc::new(MemoryTokenCache::new(clock.clone()));
        let limiter = CacheRateLimiter::new(cache.clone());
        (clock, cache, limiter)
    }

    #[tokio::test]
    async fn allows_max_then_rejects_until_window_resets() {
        let (clock, _cache, limiter) = fixture();
        let ip = "203.0.113.7";

        for _ in 0..5 {
            limiter.check(LimitClass::Login, ip).await.unwrap();
        }
        match limiter.check(LimitClass::Login, ip).await {
            Err(AuthError::RateLimited { max, window }) => {
                assert_eq!(max, 5);
                assert_eq!(window, Duration::from_secs(15 * 60));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }

        clock.advance(Duration::from_secs(15 * 60));
        limiter.check(LimitClass::Login, ip).await.unwrap();
    }

    #[tokio::test]
    async fn classes_and_addresses_are_counted_separately() {
        let (_clock, _cache, limiter) = fixture();

        for _ in 0..3 {
            limiter.check(LimitClass::Register, "10.0.0.1").await.unwrap();
        }
        assert!(limiter.check(LimitClass::Register, "10.0.0.1").await.is_err());

        limiter.check(LimitClass::Register, "10.0.0.2").await.unwrap();
        limiter.check(LimitClass::Api, "10.0.0.1").await.unwrap();
    }

    #[tokio::test]
    async fn counter_outage_allows_requests() {
        let (_clock, cache, limiter) = fixture();
        cache.set_available(false);

        for _ in 0..10 {
            limiter.check(LimitClass::Register, "10.0.0.1").await.unwrap();
        }
    }
}
