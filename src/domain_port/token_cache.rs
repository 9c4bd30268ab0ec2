use crate::domain_model::*;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("cache operation timed out")]
    Timeout,
    #[error("corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Volatile key-value tier. Every entry carries its own TTL and nothing here
/// is authoritative; policy (what TTL, what to do on failure) lives in the
/// caller.
#[async_trait::async_trait]
pub trait TokenCache: Send + Sync {
    async fn put_access_token(
        &self,
        record: &AccessTokenRecord,
        ttl: Duration,
    ) -> Result<(), CacheError>;
    async fn get_access_token(&self, token: &str) -> Result<Option<AccessTokenRecord>, CacheError>;
    async fn delete_access_token(&self, token: &str) -> Result<(), CacheError>;

    async fn put_refresh_token(
        &self,
        record: &RefreshTokenRecord,
        ttl: Duration,
    ) -> Result<(), CacheError>;
    async fn get_refresh_token(&self, token: &str)
    -> Result<Option<RefreshTokenRecord>, CacheError>;
    async fn delete_refresh_token(&self, token: &str) -> Result<(), CacheError>;

    async fn set_blacklisted(&self, token: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn is_blacklisted(&self, token: &str) -> Result<bool, CacheError>;

    async fn put_session(&self, session: &SessionData, ttl: Duration) -> Result<(), CacheError>;
    async fn get_session(
        &self,
        client_id: &ClientId,
        token: &str,
    ) -> Result<Option<SessionData>, CacheError>;
    async fn list_sessions(&self, client_id: &ClientId) -> Result<Vec<SessionData>, CacheError>;
    async fn delete_session(&self, client_id: &ClientId, token: &str) -> Result<(), CacheError>;

    async fn put_client(&self, client: &ClientWithSecrets, ttl: Duration)
    -> Result<(), CacheError>;
    async fn get_client(&self, client_id: &ClientId)
    -> Result<Option<ClientWithSecrets>, CacheError>;

    /// Atomically increments the counter at `key`, creating it with a
    /// lifetime of `window` when absent. Returns the post-increment count.
    async fn incr_window_counter(&self, key: &str, window: Duration) -> Result<u64, CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
