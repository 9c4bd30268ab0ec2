use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    clients: HashMap<ClientId, ClientWithSecrets>,
    access_tokens: HashMap<String, AccessTokenRecord>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    next_row_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> TokenRowId {
        self.next_row_id += 1;
        TokenRowId(self.next_row_id)
    }

    fn secret_taken(&self, value: &str) -> bool {
        self.clients
            .values()
            .any(|c| c.secrets.secret == value || c.secrets.secondary_secret == value)
    }
}

/// Process-local [`TokenStore`]. A single lock over all tables gives every
/// call transaction semantics.
#[derive(Default)]
pub struct MemoryTokenStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn access_token_count(&self) -> usize {
        self.lock().map(|t| t.access_tokens.len()).unwrap_or_default()
    }

    pub fn refresh_token_count(&self) -> usize {
        self.lock().map(|t| t.refresh_tokens.len()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("store offline".to_string()));
        }
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }

    fn insert_access(tables: &mut Tables, access: &NewAccessToken) -> Result<AccessTokenRecord, StoreError> {
        if tables.access_tokens.contains_key(&access.token) {
            return Err(StoreError::Conflict);
        }
        let record = AccessTokenRecord {
            id: tables.next_id(),
            client_id: access.client_id.clone(),
            token: access.token.clone(),
            expires_at: access.expires_at,
            created_at: access.created_at,
        };
        tables
            .access_tokens
            .insert(record.token.clone(), record.clone());
        Ok(record)
    }
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn create_client_with_secrets(
        &self,
        client: &Client,
        secrets: &SecretPair,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;

        let email_taken = tables.clients.values().any(|c| c.client.email == client.email);
        if email_taken
            || tables.clients.contains_key(&client.client_id)
            || secrets.secret == secrets.secondary_secret
            || tables.secret_taken(&secrets.secret)
            || tables.secret_taken(&secrets.secondary_secret)
        {
            return Err(StoreError::Conflict);
        }

        tables.clients.insert(
            client.client_id.clone(),
            ClientWithSecrets {
                client: client.clone(),
                secrets: secrets.clone(),
            },
        );
        Ok(())
    }

    async fn find_client_with_secrets(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<ClientWithSecrets>, StoreError> {
        Ok(self.lock()?.clients.get(client_id).cloned())
    }

    async fn create_login_tokens(
        &self,
        access: &NewAccessToken,
        refresh: &NewRefreshToken,
    ) -> Result<(AccessTokenRecord, RefreshTokenRecord), StoreError> {
        let mut tables = self.lock()?;

        // Check both before writing either so a conflict leaves no trace.
        if tables.access_tokens.contains_key(&access.token)
            || tables.refresh_tokens.contains_key(&refresh.token)
        {
            return Err(StoreError::Conflict);
        }

        let access = Self::insert_access(&mut tables, access)?;
        let refresh = RefreshTokenRecord {
            id: tables.next_id(),
            client_id: refresh.client_id.clone(),
            token: refresh.token.clone(),
            access_token_id: access.id,
            expires_at: refresh.expires_at,
            created_at: refresh.created_at,
        };
        tables
            .refresh_tokens
            .insert(refresh.token.clone(), refresh.clone());

        Ok((access, refresh))
    }

    async fn create_access_token(
        &self,
        access: &NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        let mut tables = self.lock()?;
        Self::insert_access(&mut tables, access)
    }

    async fn find_valid_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        Ok(self
            .lock()?
            .access_tokens
            .get(token)
            .filter(|r| r.expires_at > now)
            .cloned())
    }

    async fn find_valid_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        Ok(self
            .lock()?
            .refresh_tokens
            .get(token)
            .filter(|r| r.expires_at > now)
            .cloned())
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<PurgeCounts, StoreError> {
        let mut tables = self.lock()?;

        let access_before = tables.access_tokens.len();
        tables.access_tokens.retain(|_, r| r.expires_at >= before);
        let refresh_before = tables.refresh_tokens.len();
        tables.refresh_tokens.retain(|_, r| r.expires_at >= before);

        Ok(PurgeCounts {
            access_tokens: (access_before - tables.access_tokens.len()) as u64,
            refresh_tokens: (refresh_before - tables.refresh_tokens.len()) as u64,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}
