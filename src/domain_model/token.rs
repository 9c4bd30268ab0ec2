use super::ClientId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct TokenRowId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccessToken {
    pub client_id: ClientId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRefreshToken {
    pub client_id: ClientId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    pub id: TokenRowId,
    pub client_id: ClientId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: TokenRowId,
    pub client_id: ClientId,
    pub token: String,
    pub access_token_id: TokenRowId,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl AccessTokenRecord {
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        remaining_until(self.expires_at, now)
    }
}

impl RefreshTokenRecord {
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        remaining_until(self.expires_at, now)
    }
}

/// Time left before `expires_at`, or `None` once it has passed.
pub fn remaining_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    (expires_at - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Short, irreversible tag for a token so log lines never carry the secret.
pub fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(12);
    hex
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeCounts {
    pub access_tokens: u64,
    pub refresh_tokens: u64,
}
