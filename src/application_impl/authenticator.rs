use super::CacheLayer;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;

/// Resolves a presented bearer token to the client that owns it.
pub struct Authenticator {
    store: Arc<dyn TokenStore>,
    cache: CacheLayer,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn TokenStore>, cache: CacheLayer, clock: Arc<dyn Clock>) -> Self {
        Authenticator {
            store,
            cache,
            clock,
        }
    }

    /// Blacklist first, so a revoked token is refused even while its
    /// store and cache entries are still live.
    pub async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        if token.is_empty() {
            return Err(AuthError::NotFoundOrExpired);
        }

        if self.cache.is_blacklisted(token).await {
            debug!(token = %fingerprint(token), "rejecting revoked token");
            return Err(AuthError::Revoked);
        }

        let record = self
            .resolve_access_token(token)
            .await?
            .ok_or(AuthError::NotFoundOrExpired)?;

        self.cache.touch_session(&record.client_id, token).await;

        Ok(AuthContext {
            client_id: record.client_id,
            token: record.token,
        })
    }

    /// Cache, then store. A store hit is written back to the cache.
    pub async fn resolve_access_token(
        &self,
        token: &str,
    ) -> Result<Option<AccessTokenRecord>, AuthError> {
        if let Some(record) = self.cache.access_token(token).await {
            return Ok(Some(record));
        }

        // Stores that fold case could hand back a different token.
        let found = self
            .store
            .find_valid_access_token(token, self.clock.now())
            .await?
            .filter(|r| r.token == token);

        if let Some(record) = &found {
            trace!(token = %fingerprint(token), "backfilling access token");
            self.cache.cache_access_token(record).await;
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryTokenStore>,
        cache: Arc<MemoryTokenCache>,
        clock: Arc<ManualClock>,
        authenticator: Authenticator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryTokenStore::new());
        let cache = Arc::new(MemoryTokenCache::new(clock.clone()));
        let authenticator = Authenticator::new(
            store.clone(),
            CacheLayer::new(cache.clone(), clock.clone()),
            clock.clone(),
        );
        Fixture {
            store,
            cache,
            clock,
            authenticator,
        }
    }

    async fn issue(fx: &Fixture, token: &str, lifetime: Duration) -> AccessTokenRecord {
        let now = fx.clock.now();
        fx.store
            .create_access_token(&NewAccessToken {
                client_id: ClientId::from("client-a"),
                token: token.to_string(),
                expires_at: now + lifetime,
                created_at: now,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn store_hit_is_backfilled_exactly_once() {
        let fx = fixture();
        issue(&fx, "tok-1", Duration::from_secs(3600)).await;
        let key = cache_key::access_token("tok-1");

        let ctx = fx.authenticator.authenticate("tok-1").await.unwrap();
        assert_eq!(ctx.client_id, ClientId::from("client-a"));
        assert_eq!(fx.cache.write_count(&key), 1);
        assert_eq!(fx.cache.ttl(&key), Some(Duration::from_secs(3600)));

        // Served from cache now, even with the store offline.
        fx.store.set_failing(true);
        fx.authenticator.authenticate("tok-1").await.unwrap();
        assert_eq!(fx.cache.write_count(&key), 1);
    }

    #[tokio::test]
    async fn token_validates_until_expiry_only() {
        let fx = fixture();
        issue(&fx, "tok-1", Duration::from_secs(60)).await;

        fx.clock.advance(Duration::from_secs(59));
        assert!(fx.authenticator.authenticate("tok-1").await.is_ok());

        fx.clock.advance(Duration::from_secs(1));
        assert!(matches!(
            fx.authenticator.authenticate("tok-1").await,
            Err(AuthError::NotFoundOrExpired)
        ));
    }

    #[tokio::test]
    async fn blacklist_wins_over_live_records() {
        let fx = fixture();
        issue(&fx, "tok-1", Duration::from_secs(3600)).await;
        fx.authenticator.authenticate("tok-1").await.unwrap();

        fx.cache
            .set_blacklisted("tok-1", Duration::from_secs(3600))
            .await
            .unwrap();

        assert!(matches!(
            fx.authenticator.authenticate("tok-1").await,
            Err(AuthError::Revoked)
        ));
    }

    #[tokio::test]
    async fn cache_outage_falls_back_to_store() {
        let fx = fixture();
        issue(&fx, "tok-1", Duration::from_secs(3600)).await;
        fx.cache.set_available(false);

        let ctx = fx.authenticator.authenticate("tok-1").await.unwrap();
        assert_eq!(ctx.token, "tok-1");
    }

    #[tokio::test]
    async fn store_failure_propagates() {
        let fx = fixture();
        fx.store.set_failing(true);

        assert!(matches!(
            fx.authenticator.authenticate("tok-1").await,
            Err(AuthError::Store(_))
        ));
    }

    #[tokio::test]
    async fn unknown_and_empty_tokens_are_rejected() {
        let fx = fixture();
        for token in ["", "never-issued"] {
            assert!(matches!(
                fx.authenticator.authenticate(token).await,
                Err(AuthError::NotFoundOrExpired)
            ));
        }
    }
}
