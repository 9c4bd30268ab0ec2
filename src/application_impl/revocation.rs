use super::{Authenticator, CacheLayer};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;

pub struct RevocationService {
    authenticator: Arc<Authenticator>,
    cache: CacheLayer,
    clock: Arc<dyn Clock>,
}

impl RevocationService {
    pub fn new(authenticator: Arc<Authenticator>, cache: CacheLayer, clock: Arc<dyn Clock>) -> Self {
        RevocationService {
            authenticator,
            cache,
            clock,
        }
    }

    /// Blacklists `token` for the rest of its natural life and clears its
    /// cache and session entries. Unknown or already expired tokens are a
    /// successful no-op, so the call is safe to repeat.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        match self.authenticator.resolve_access_token(token).await? {
            Some(record) => self.revoke_record(&record).await,
            None => Ok(()),
        }
    }

    /// Like [`RevocationService::revoke`], but only for a token owned by
    /// `client_id`.
    pub async fn revoke_session(&self, client_id: &ClientId, token: &str) -> Result<(), AuthError> {
        let Some(record) = self.authenticator.resolve_access_token(token).await? else {
            return Ok(());
        };

        if record.client_id != *client_id {
            warn!(
                %client_id,
                owner = %record.client_id,
                token = %fingerprint(token),
                "refusing to revoke another client's session"
            );
            return Err(AuthError::Forbidden);
        }

        self.revoke_record(&record).await
    }

    async fn revoke_record(&self, record: &AccessTokenRecord) -> Result<(), AuthError> {
        let Some(ttl) = record.remaining(self.clock.now()) else {
            return Ok(());
        };

        self.cache
            .blacklist(&record.token, ttl)
            .await
            .map_err(|e| AuthError::CacheUnavailable(e.to_string()))?;

        self.cache.evict_access_token(&record.token).await;
        self.cache.drop_session(&record.client_id, &record.token).await;

        info!(
            client_id = %record.client_id,
            token = %fingerprint(&record.token),
            ttl_secs = ttl.as_secs(),
            "access token revoked"
        );
        Ok(())
    }
}
