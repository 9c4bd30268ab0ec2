use crate::domain_model::*;
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("client already exists")]
    ClientExists,
    /// Absent and expired are deliberately indistinguishable to callers.
    #[error("token invalid or expired")]
    NotFoundOrExpired,
    #[error("token revoked")]
    Revoked,
    #[error("token belongs to another client")]
    Forbidden,
    #[error("rate limit exceeded: {max} requests per {}s", .window.as_secs())]
    RateLimited { max: u64, window: Duration },
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("store operation timed out")]
    StoreTimeout,
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => AuthError::StoreTimeout,
            other => AuthError::Store(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterClientInput {
    pub name: String,
    pub email: String,
    pub is_active: bool,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredClient {
    pub client_id: ClientId,
    pub secret: String,
    pub secondary_secret: String,
}

/// Where a request came from, as reported by the transport layer.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub client_id: ClientId,
    pub secret: String,
    pub meta: ClientMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RefreshInput {
    pub refresh_token: String,
    pub meta: ClientMeta,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshedToken {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
}

/// Identity resolved from a bearer token, handed explicitly to whatever runs
/// after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub client_id: ClientId,
    pub token: String,
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn register_client(
        &self,
        input: RegisterClientInput,
    ) -> Result<RegisteredClient, AuthError>;
    async fn login(&self, input: LoginInput) -> Result<IssuedTokens, AuthError>;
    async fn refresh(&self, input: RefreshInput) -> Result<RefreshedToken, AuthError>;
    async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError>;
    async fn logout(&self, ctx: &AuthContext) -> Result<(), AuthError>;
    async fn list_sessions(&self, client_id: &ClientId) -> Result<Vec<SessionData>, AuthError>;
    async fn revoke_session(&self, client_id: &ClientId, token: &str) -> Result<(), AuthError>;
    /// The store is required; the cache is reported but optional.
    async fn health(&self) -> HealthReport;
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store: bool,
    pub cache: bool,
}
