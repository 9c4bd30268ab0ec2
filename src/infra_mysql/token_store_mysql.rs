use super::util::store_error;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlConnection, MySqlPool, Row};
use std::time::Duration;

pub struct MySqlTokenStore {
    pool: MySqlPool,
    op_timeout: Duration,
}

impl MySqlTokenStore {
    pub fn new(pool: MySqlPool, op_timeout: Duration) -> Self {
        MySqlTokenStore { pool, op_timeout }
    }

    /// Runs `op` under the operation deadline. A transaction still open
    /// when the deadline hits is dropped and therefore rolled back.
    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(store_error),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    async fn insert_access(
        conn: &mut MySqlConnection,
        access: &NewAccessToken,
    ) -> Result<AccessTokenRecord, sqlx::Error> {
        let id = sqlx::query(
            r#"
INSERT INTO access_tokens (client_id, token, expired_at, created_at)
VALUES (?, ?, ?, ?)
"#,
        )
        .bind(&access.client_id)
        .bind(&access.token)
        .bind(access.expires_at)
        .bind(access.created_at)
        .execute(conn)
        .await?
        .last_insert_id();

        Ok(AccessTokenRecord {
            id: TokenRowId(id),
            client_id: access.client_id.clone(),
            token: access.token.clone(),
            expires_at: access.expires_at,
            created_at: access.created_at,
        })
    }

    fn row_to_access(row: MySqlRow) -> Result<AccessTokenRecord, sqlx::Error> {
        Ok(AccessTokenRecord {
            id: TokenRowId(row.try_get("id")?),
            client_id: ClientId(row.try_get("client_id")?),
            token: row.try_get("token")?,
            expires_at: row.try_get("expired_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_refresh(row: MySqlRow) -> Result<RefreshTokenRecord, sqlx::Error> {
        Ok(RefreshTokenRecord {
            id: TokenRowId(row.try_get("id")?),
            client_id: ClientId(row.try_get("client_id")?),
            token: row.try_get("token")?,
            access_token_id: TokenRowId(row.try_get("access_token_id")?),
            expires_at: row.try_get("expired_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_client(row: MySqlRow) -> Result<ClientWithSecrets, sqlx::Error> {
        Ok(ClientWithSecrets {
            client: Client {
                client_id: ClientId(row.try_get("client_id")?),
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                is_active: row.try_get("is_active")?,
                description: row.try_get("description")?,
                created_at: row.try_get("created_at")?,
            },
            secrets: SecretPair {
                secret: row.try_get("secret")?,
                secondary_secret: row.try_get("secondary_secret")?,
            },
        })
    }
}

#[async_trait::async_trait]
impl TokenStore for MySqlTokenStore {
    async fn create_client_with_secrets(
        &self,
        client: &Client,
        secrets: &SecretPair,
    ) -> Result<(), StoreError> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                r#"
INSERT INTO clients (client_id, name, email, is_active, description, created_at)
VALUES (?, ?, ?, ?, ?, ?)
"#,
            )
            .bind(&client.client_id)
            .bind(&client.name)
            .bind(&client.email)
            .bind(client.is_active)
            .bind(&client.description)
            .bind(client.created_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
INSERT INTO client_secrets (client_id, secret, secondary_secret, created_at)
VALUES (?, ?, ?, ?)
"#,
            )
            .bind(&client.client_id)
            .bind(&secrets.secret)
            .bind(&secrets.secondary_secret)
            .bind(client.created_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await
        })
        .await
    }

    async fn find_client_with_secrets(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<ClientWithSecrets>, StoreError> {
        self.bounded(async {
            let row = sqlx::query(
                r#"
SELECT c.client_id, c.name, c.email, c.is_active, c.description, c.created_at,
       s.secret, s.secondary_secret
FROM clients c
JOIN client_secrets s ON s.client_id = c.client_id
WHERE c.client_id = ?
"#,
            )
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

            let found = row.map(Self::row_to_client).transpose()?;
            Ok(found.filter(|c| c.client.client_id == *client_id))
        })
        .await
    }

    async fn create_login_tokens(
        &self,
        access: &NewAccessToken,
        refresh: &NewRefreshToken,
    ) -> Result<(AccessTokenRecord, RefreshTokenRecord), StoreError> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;

            let access = Self::insert_access(&mut *tx, access).await?;

            let refresh_id = sqlx::query(
                r#"
INSERT INTO refresh_tokens (client_id, token, access_token_id, expired_at, created_at)
VALUES (?, ?, ?, ?, ?)
"#,
            )
            .bind(&refresh.client_id)
            .bind(&refresh.token)
            .bind(access.id)
            .bind(refresh.expires_at)
            .bind(refresh.created_at)
            .execute(&mut *tx)
            .await?
            .last_insert_id();

            tx.commit().await?;

            let refresh = RefreshTokenRecord {
                id: TokenRowId(refresh_id),
                client_id: refresh.client_id.clone(),
                token: refresh.token.clone(),
                access_token_id: access.id,
                expires_at: refresh.expires_at,
                created_at: refresh.created_at,
            };
            Ok((access, refresh))
        })
        .await
    }

    async fn create_access_token(
        &self,
        access: &NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        self.bounded(async {
            let mut conn = self.pool.acquire().await?;
            Self::insert_access(&mut *conn, access).await
        })
        .await
    }

    async fn find_valid_access_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        self.bounded(async {
            let row = sqlx::query(
                r#"
SELECT id, client_id, token, expired_at, created_at
FROM access_tokens
WHERE token = ? AND expired_at > ?
"#,
            )
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            // Exact match even if the column collation folds case.
            let found = row.map(Self::row_to_access).transpose()?;
            Ok(found.filter(|r| r.token == token))
        })
        .await
    }

    async fn find_valid_refresh_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        self.bounded(async {
            let row = sqlx::query(
                r#"
SELECT id, client_id, token, access_token_id, expired_at, created_at
FROM refresh_tokens
WHERE token = ? AND expired_at > ?
"#,
            )
            .bind(token)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            let found = row.map(Self::row_to_refresh).transpose()?;
            Ok(found.filter(|r| r.token == token))
        })
        .await
    }

    async fn delete_expired(&self, before: DateTime<Utc>) -> Result<PurgeCounts, StoreError> {
        let access_tokens = self
            .bounded(async {
                sqlx::query("DELETE FROM access_tokens WHERE expired_at < ?")
                    .bind(before)
                    .execute(&self.pool)
                    .await
            })
            .await?
            .rows_affected();

        let refresh_tokens = self
            .bounded(async {
                sqlx::query("DELETE FROM refresh_tokens WHERE expired_at < ?")
                    .bind(before)
                    .execute(&self.pool)
                    .await
            })
            .await?
            .rows_affected();

        Ok(PurgeCounts {
            access_tokens,
            refresh_tokens,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(async {
            sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&self.pool)
                .await
                .map(|_| ())
        })
        .await
    }
}
