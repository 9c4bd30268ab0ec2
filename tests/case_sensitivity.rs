use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tollgate::application_impl::*;
use tollgate::application_port::*;
use tollgate::domain_model::*;
use tollgate::domain_port::*;
use tollgate::infra_memory::*;

/// Store whose lookups ignore ASCII case, like a MySQL column left on a
/// `_ci` collation.
#[derive(Default)]
struct CaseFoldingStore {
    inner: MemoryTokenStore,
    known: Mutex<Vec<String>>,
}

impl CaseFoldingStore {
    fn remember(&self, key: &str) {
        self.known.lock().unwrap().push(key.to_owned());
    }

    fn fold(&self, key: &str) -> String {
        self.known
            .lock()
            .unwrap()
            .iter()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
            .unwrap_or_else(|| key.to_owned())
    }
}

#[async_trait]
impl TokenStore for CaseFoldingStore {
    async fn create_client_with_secrets(
        &self,
        client: &Client,
        secrets: &SecretPair,
    ) -> Result<(), StoreError> {
        self.inner.create_client_with_secrets(client, secrets).await?;
        self.remember(client.client_id.as_str());
        Ok(())
    }

    async fn find_client_with_secrets(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<ClientWithSecrets>, StoreError> {
        let folded = ClientId(self.fold(client_id.as_str()));
        self.inner.find_client_with_secrets(&folded).await
    }

    async fn create_login_tokens(
        &self,
        access: &NewAccessToken,
        refresh: &NewRefreshToken,
    ) -> Result<(AccessTokenRecord, RefreshTokenRecord), StoreError> {
        let created = self.inner.create_login_tokens(access, refresh).await?;
        self.remember(&access.token);
        self.remember(&refresh.token);
        Ok(created)
    }

    async fn create_access_token(
        &self,
        access: &NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        let created = self.inner.create_access_token(access).await?;
        self.remember(&access.token);
        Ok(created)
    }

    async fn find_valid_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        self.inner.find_valid_access_token(&self.fold(token), now).await
    }

    async fn find_valid_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        self.inner.find_valid_refresh_token(&self.fold(token), now).await
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<PurgeCounts, StoreError> {
        self.inner.delete_expired(before).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

fn flip_case(value: &str) -> String {
    let mut flipped = false;
    value
        .chars()
        .map(|c| {
            if !flipped && c.is_ascii_alphabetic() {
                flipped = true;
                if c.is_ascii_lowercase() {
                    c.to_ascii_uppercase()
                } else {
                    c.to_ascii_lowercase()
                }
            } else {
                c
            }
        })
        .collect()
}

async fn logged_in() -> (RealAuthService, RegisteredClient, IssuedTokens) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2031, 3, 14, 9, 0, 0).unwrap(),
    ));
    let store = Arc::new(CaseFoldingStore::default());
    let cache = Arc::new(MemoryTokenCache::new(clock.clone()));
    let service = RealAuthService::new(store, cache, clock, TokenLifetimes::default());

    let client = service
        .register_client(RegisterClientInput {
            name: "ledger".to_string(),
            email: "ledger@example.com".to_string(),
            is_active: true,
            description: String::new(),
        })
        .await
        .unwrap();
    let tokens = service
        .login(LoginInput {
            client_id: client.client_id.clone(),
            secret: client.secret.clone(),
            meta: ClientMeta::default(),
        })
        .await
        .unwrap();
    (service, client, tokens)
}

#[tokio::test]
async fn case_variant_of_a_revoked_token_is_not_accepted() {
    let (service, _client, tokens) = logged_in().await;
    let variant = flip_case(&tokens.access_token);
    assert_ne!(variant, tokens.access_token);

    let ctx = service.authenticate(&tokens.access_token).await.unwrap();
    service.logout(&ctx).await.unwrap();

    assert!(matches!(
        service.authenticate(&tokens.access_token).await,
        Err(AuthError::Revoked)
    ));
    assert!(matches!(
        service.authenticate(&variant).await,
        Err(AuthError::NotFoundOrExpired)
    ));
}

#[tokio::test]
async fn case_variant_of_a_refresh_token_is_rejected() {
    let (service, _client, tokens) = logged_in().await;

    let result = service
        .refresh(RefreshInput {
            refresh_token: flip_case(&tokens.refresh_token),
            meta: ClientMeta::default(),
        })
        .await;
    assert!(matches!(result, Err(AuthError::NotFoundOrExpired)));
}

#[tokio::test]
async fn case_variant_of_a_client_id_cannot_log_in() {
    let (service, client, _tokens) = logged_in().await;

    let result = service
        .login(LoginInput {
            client_id: ClientId(flip_case(client.client_id.as_str())),
            secret: client.secret.clone(),
            meta: ClientMeta::default(),
        })
        .await;
    assert!(matches!(result, Err(AuthError::InvalidCredentials)));
}
