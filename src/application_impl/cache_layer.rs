use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const CLIENT_TTL: Duration = Duration::from_secs(5 * 60);

/// Cache-aside policy over a [`TokenCache`] backend.
///
/// Reads turn any backend error into a miss and writes log and drop their
/// errors, so callers never fail because the cache tier is down. The only
/// exception is [`CacheLayer::blacklist`], which revocation depends on.
#[derive(Clone)]
pub struct CacheLayer {
    cache: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
}

fn swallow<T>(op: &'static str, result: Result<T, CacheError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(op, error = %e, "cache operation failed, continuing without cache");
            None
        }
    }
}

impl CacheLayer {
    pub fn new(cache: Arc<dyn TokenCache>, clock: Arc<dyn Clock>) -> Self {
        CacheLayer { cache, clock }
    }

    pub async fn access_token(&self, token: &str) -> Option<AccessTokenRecord> {
        let record = swallow("get_access_token", self.cache.get_access_token(token).await)??;
        if record.expires_at <= self.clock.now() {
            debug!(token = %fingerprint(token), "evicting stale cached access token");
            swallow("delete_access_token", self.cache.delete_access_token(token).await);
            return None;
        }
        Some(record)
    }

    pub async fn cache_access_token(&self, record: &AccessTokenRecord) {
        let Some(ttl) = record.remaining(self.clock.now()) else {
            return;
        };
        swallow(
            "put_access_token",
            self.cache.put_access_token(record, ttl).await,
        );
    }

    pub async fn evict_access_token(&self, token: &str) {
        swallow("delete_access_token", self.cache.delete_access_token(token).await);
    }

    pub async fn refresh_token(&self, token: &str) -> Option<RefreshTokenRecord> {
        let record = swallow("get_refresh_token", self.cache.get_refresh_token(token).await)??;
        if record.expires_at <= self.clock.now() {
            debug!(token = %fingerprint(token), "evicting stale cached refresh token");
            swallow("delete_refresh_token", self.cache.delete_refresh_token(token).await);
            return None;
        }
        Some(record)
    }

    pub async fn cache_refresh_token(&self, record: &RefreshTokenRecord) {
        let Some(ttl) = record.remaining(self.clock.now()) else {
            return;
        };
        swallow(
            "put_refresh_token",
            self.cache.put_refresh_token(record, ttl).await,
        );
    }

    /// Fails open: an unreachable cache reports "not blacklisted".
    pub async fn is_blacklisted(&self, token: &str) -> bool {
        swallow("is_blacklisted", self.cache.is_blacklisted(token).await).unwrap_or(false)
    }

    pub async fn blacklist(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        self.cache.set_blacklisted(token, ttl).await
    }

    pub async fn client(&self, client_id: &ClientId) -> Option<ClientWithSecrets> {
        swallow("get_client", self.cache.get_client(client_id).await)?
    }

    pub async fn cache_client(&self, client: &ClientWithSecrets) {
        swallow("put_client", self.cache.put_client(client, CLIENT_TTL).await);
    }

    pub async fn record_session(&self, session: &SessionData) {
        swallow("put_session", self.cache.put_session(session, SESSION_TTL).await);
    }

    /// Bumps last activity and restarts the session TTL. Missing sessions
    /// stay missing.
    pub async fn touch_session(&self, client_id: &ClientId, token: &str) {
        let Some(Some(mut session)) =
            swallow("get_session", self.cache.get_session(client_id, token).await)
        else {
            return;
        };
        session.last_activity = self.clock.now();
        self.record_session(&session).await;
    }

    pub async fn sessions(&self, client_id: &ClientId) -> Vec<SessionData> {
        swallow("list_sessions", self.cache.list_sessions(client_id).await).unwrap_or_default()
    }

    pub async fn drop_session(&self, client_id: &ClientId, token: &str) {
        swallow("delete_session", self.cache.delete_session(client_id, token).await);
    }

    pub async fn ping(&self) -> bool {
        swallow("ping", self.cache.ping().await).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::*;
    use chrono::{TimeZone, Utc};

    fn fixture() -> (Arc<ManualClock>, Arc<MemoryTokenCache>, CacheLayer) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap(),
        ));
        let cache = Arc::new(MemoryTokenCache::new(clock.clone()));
        let layer = CacheLayer::new(cache.clone(), clock.clone());
        (clock, cache, layer)
    }

    #[tokio::test]
    async fn stale_access_token_hit_is_a_miss_and_evicted() {
        let (clock, cache, layer) = fixture();
        let record = AccessTokenRecord {
            id: TokenRowId(1),
            client_id: ClientId::from("client-a"),
            token: "tok-1".to_string(),
            expires_at: clock.now(),
            created_at: clock.now() - chrono::Duration::hours(1),
        };
        // Entry outlives the token, as after clock skew between hosts.
        cache
            .put_access_token(&record, Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(layer.access_token("tok-1").await, None);
        assert!(!cache.contains_key(&cache_key::access_token("tok-1")));
    }

    #[tokio::test]
    async fn stale_refresh_token_hit_is_a_miss_and_evicted() {
        let (clock, cache, layer) = fixture();
        let record = RefreshTokenRecord {
            id: TokenRowId(2),
            client_id: ClientId::from("client-a"),
            token: "ref-1".to_string(),
            access_token_id: TokenRowId(1),
            expires_at: clock.now() - chrono::Duration::seconds(1),
            created_at: clock.now() - chrono::Duration::days(7),
        };
        cache
            .put_refresh_token(&record, Duration::from_secs(600))
            .await
            .unwrap();

        assert_eq!(layer.refresh_token("ref-1").await, None);
        assert!(!cache.contains_key(&cache_key::refresh_token("ref-1")));
    }

    #[tokio::test]
    async fn touch_moves_activity_and_restarts_ttl() {
        let (clock, cache, layer) = fixture();
        let client_id = ClientId::from("client-a");
        let started = clock.now();
        layer
            .record_session(&SessionData::start(
                client_id.clone(),
                "tok-1",
                "192.0.2.1",
                "curl/8.0",
                started,
            ))
            .await;

        clock.advance(Duration::from_secs(3 * 60 * 60));
        layer.touch_session(&client_id, "tok-1").await;

        let session = cache.get_session(&client_id, "tok-1").await.unwrap().unwrap();
        assert_eq!(session.login_time, started);
        assert_eq!(session.last_activity, clock.now());
        assert_eq!(
            cache.ttl(&cache_key::session(&client_id, "tok-1")),
            Some(SESSION_TTL)
        );
    }

    #[tokio::test]
    async fn touch_does_not_resurrect_missing_sessions() {
        let (_clock, cache, layer) = fixture();
        let client_id = ClientId::from("client-a");

        layer.touch_session(&client_id, "tok-1").await;

        assert!(!cache.contains_key(&cache_key::session(&client_id, "tok-1")));
    }
}
