use super::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        TokenLifetimes {
            access: Duration::from_secs(24 * 60 * 60),
            refresh: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

pub struct RealAuthService {
    store: Arc<dyn TokenStore>,
    cache: CacheLayer,
    authenticator: Arc<Authenticator>,
    revocation: RevocationService,
    clock: Arc<dyn Clock>,
    lifetimes: TokenLifetimes,
}

impl RealAuthService {
    pub fn new(
        store: Arc<dyn TokenStore>,
        cache: Arc<dyn TokenCache>,
        clock: Arc<dyn Clock>,
        lifetimes: TokenLifetimes,
    ) -> Self {
        let cache = CacheLayer::new(cache, clock.clone());
        let authenticator = Arc::new(Authenticator::new(
            store.clone(),
            cache.clone(),
            clock.clone(),
        ));
        let revocation = RevocationService::new(authenticator.clone(), cache.clone(), clock.clone());

        RealAuthService {
            store,
            cache,
            authenticator,
            revocation,
            clock,
            lifetimes,
        }
    }

    async fn client_with_secrets(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<ClientWithSecrets>, AuthError> {
        if let Some(client) = self.cache.client(client_id).await {
            return Ok(Some(client));
        }

        let found = self
            .store
            .find_client_with_secrets(client_id)
            .await?
            .filter(|c| c.client.client_id == *client_id);
        if let Some(client) = &found {
            self.cache.cache_client(client).await;
        }
        Ok(found)
    }

    async fn resolve_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, AuthError> {
        if let Some(record) = self.cache.refresh_token(token).await {
            return Ok(Some(record));
        }

        let found = self
            .store
            .find_valid_refresh_token(token, self.clock.now())
            .await?
            .filter(|r| r.token == token);
        if let Some(record) = &found {
            self.cache.cache_refresh_token(record).await;
        }
        Ok(found)
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn register_client(
        &self,
        input: RegisterClientInput,
    ) -> Result<RegisteredClient, AuthError> {
        let RegisterClientInput {
            name,
            email,
            is_active,
            description,
        } = input;

        let client = Client {
            client_id: ClientId(generate_credential()),
            name,
            email,
            is_active,
            description,
            created_at: self.clock.now(),
        };
        let secrets = SecretPair {
            secret: generate_credential(),
            secondary_secret: generate_credential(),
        };

        self.store
            .create_client_with_secrets(&client, &secrets)
            .await
            .map_err(|e| match e {
                StoreError::Conflict => AuthError::ClientExists,
                other => AuthError::from(other),
            })?;

        info!(client_id = %client.client_id, "client registered");

        Ok(RegisteredClient {
            client_id: client.client_id,
            secret: secrets.secret,
            secondary_secret: secrets.secondary_secret,
        })
    }

    async fn login(&self, input: LoginInput) -> Result<IssuedTokens, AuthError> {
        let LoginInput {
            client_id,
            secret,
            meta,
        } = input;

        let record = self
            .client_with_secrets(&client_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !record.client.is_active || !record.secrets.matches(&secret) {
            return Err(AuthError::InvalidCredentials);
        }
        let client_id = record.client.client_id;

        let now = self.clock.now();
        let access = NewAccessToken {
            client_id: client_id.clone(),
            token: generate_credential(),
            expires_at: now + self.lifetimes.access,
            created_at: now,
        };
        let refresh = NewRefreshToken {
            client_id: client_id.clone(),
            token: generate_credential(),
            expires_at: now + self.lifetimes.refresh,
            created_at: now,
        };

        let (access, refresh) = self.store.create_login_tokens(&access, &refresh).await?;

        self.cache.cache_access_token(&access).await;
        self.cache.cache_refresh_token(&refresh).await;
        self.cache
            .record_session(&SessionData::start(
                client_id.clone(),
                &access.token,
                &meta.ip_address,
                &meta.user_agent,
                now,
            ))
            .await;

        info!(
            %client_id,
            token = %fingerprint(&access.token),
            ip = %meta.ip_address,
            "client logged in"
        );

        Ok(IssuedTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            access_expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    async fn refresh(&self, input: RefreshInput) -> Result<RefreshedToken, AuthError> {
        let RefreshInput {
            refresh_token,
            meta,
        } = input;

        let refresh = self
            .resolve_refresh_token(&refresh_token)
            .await?
            .ok_or(AuthError::NotFoundOrExpired)?;

        let now = self.clock.now();
        let access = NewAccessToken {
            client_id: refresh.client_id.clone(),
            token: generate_credential(),
            expires_at: now + self.lifetimes.access,
            created_at: now,
        };
        let access = self.store.create_access_token(&access).await?;

        self.cache.cache_access_token(&access).await;
        self.cache
            .record_session(&SessionData::start(
                access.client_id.clone(),
                &access.token,
                &meta.ip_address,
                &meta.user_agent,
                now,
            ))
            .await;

        info!(
            client_id = %access.client_id,
            token = %fingerprint(&access.token),
            "access token refreshed"
        );

        Ok(RefreshedToken {
            access_token: access.token,
            access_expires_at: access.expires_at,
        })
    }

    async fn authenticate(&self, token: &str) -> Result<AuthContext, AuthError> {
        self.authenticator.authenticate(token).await
    }

    async fn logout(&self, ctx: &AuthContext) -> Result<(), AuthError> {
        self.revocation.revoke(&ctx.token).await
    }

    async fn list_sessions(&self, client_id: &ClientId) -> Result<Vec<SessionData>, AuthError> {
        let mut sessions = self.cache.sessions(client_id).await;
        sessions.sort_by(|a, b| b.login_time.cmp(&a.login_time));
        Ok(sessions)
    }

    async fn revoke_session(&self, client_id: &ClientId, token: &str) -> Result<(), AuthError> {
        self.revocation.revoke_session(client_id, token).await
    }

    async fn health(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "store health check failed");
                false
            }
        };
        HealthReport {
            store,
            cache: self.cache.ping().await,
        }
    }
}
