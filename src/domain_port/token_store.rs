use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Conflict,
    #[error("store operation timed out")]
    Timeout,
    #[error("store error: {0}")]
    Backend(String),
}

/// Durable source of truth for clients and tokens.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Inserts the client and its secret pair in one transaction.
    async fn create_client_with_secrets(
        &self,
        client: &Client,
        secrets: &SecretPair,
    ) -> Result<(), StoreError>;

    async fn find_client_with_secrets(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<ClientWithSecrets>, StoreError>;

    /// Inserts both tokens of a login in one transaction. The refresh row
    /// points at the access row created here.
    async fn create_login_tokens(
        &self,
        access: &NewAccessToken,
        refresh: &NewRefreshToken,
    ) -> Result<(AccessTokenRecord, RefreshTokenRecord), StoreError>;

    async fn create_access_token(
        &self,
        access: &NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError>;

    /// Rows with `expires_at <= now` are reported as absent but left in place.
    async fn find_valid_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessTokenRecord>, StoreError>;

    async fn find_valid_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError>;

    /// Deletes access rows, then refresh rows, that expired before `before`.
    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<PurgeCounts, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
