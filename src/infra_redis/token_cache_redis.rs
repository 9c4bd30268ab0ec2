use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisResult, Script};
use std::collections::HashMap;
use std::time::Duration;

const WINDOW_INCR: &str = include_str!("window_incr.lua");
const SCAN_BATCH: usize = 100;

pub struct RedisTokenCache {
    conn: ConnectionManager,
    op_timeout: Duration,
    window_incr: Script,
}

impl RedisTokenCache {
    pub fn new(conn: ConnectionManager, op_timeout: Duration) -> Self {
        RedisTokenCache {
            conn,
            op_timeout,
            window_incr: Script::new(WINDOW_INCR),
        }
    }

    async fn run<T>(&self, op: impl Future<Output = RedisResult<T>>) -> Result<T, CacheError> {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(|e| CacheError::Unavailable(e.to_string())),
            Err(_) => Err(CacheError::Timeout),
        }
    }

    async fn put_hash(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let Some(ms) = ttl_millis(ttl) else {
            return Ok(());
        };
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .del(key)
            .ignore()
            .hset_multiple(key, fields)
            .ignore()
            .pexpire(key, ms as i64)
            .ignore();
        let _: () = self.run(pipe.query_async(&mut conn)).await?;
        Ok(())
    }

    async fn get_hash(&self, key: &str) -> Result<Option<HashMap<String, String>>, CacheError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = self.run(conn.hgetall(key)).await?;
        Ok((!fields.is_empty()).then_some(fields))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        self.run(conn.del::<_, ()>(key)).await
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = self
                .run(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH)
                        .query_async(&mut conn),
                )
                .await?;
            keys.extend(batch);
            if next == 0 {
                return Ok(keys);
            }
            cursor = next;
        }
    }
}

/// Whole milliseconds of `ttl`, rounded down so an entry never outlives
/// what it shadows. `None` when nothing is left to store.
fn ttl_millis(ttl: Duration) -> Option<u64> {
    u64::try_from(ttl.as_millis()).ok().filter(|ms| *ms > 0)
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> Result<&'a str, CacheError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| CacheError::Corrupt(format!("missing field {name}")))
}

fn parse_u64(fields: &HashMap<String, String>, name: &str) -> Result<u64, CacheError> {
    field(fields, name)?
        .parse()
        .map_err(|_| CacheError::Corrupt(format!("field {name} is not a number")))
}

fn parse_time(fields: &HashMap<String, String>, name: &str) -> Result<DateTime<Utc>, CacheError> {
    let millis: i64 = field(fields, name)?
        .parse()
        .map_err(|_| CacheError::Corrupt(format!("field {name} is not a timestamp")))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| CacheError::Corrupt(format!("field {name} out of range")))
}

fn parse_bool(fields: &HashMap<String, String>, name: &str) -> Result<bool, CacheError> {
    match field(fields, name)? {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        other => Err(CacheError::Corrupt(format!("field {name} is not a bool: {other}"))),
    }
}

#[async_trait::async_trait]
impl TokenCache for RedisTokenCache {
    async fn put_access_token(
        &self,
        record: &AccessTokenRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let fields = [
            ("id", record.id.0.to_string()),
            ("client_id", record.client_id.to_string()),
            ("expired_at", record.expires_at.timestamp_millis().to_string()),
            ("created_at", record.created_at.timestamp_millis().to_string()),
        ];
        self.put_hash(&cache_key::access_token(&record.token), &fields, ttl)
            .await
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessTokenRecord>, CacheError> {
        let Some(fields) = self.get_hash(&cache_key::access_token(token)).await? else {
            return Ok(None);
        };
        Ok(Some(AccessTokenRecord {
            id: TokenRowId(parse_u64(&fields, "id")?),
            client_id: ClientId::from(field(&fields, "client_id")?),
            token: token.to_owned(),
            expires_at: parse_time(&fields, "expired_at")?,
            created_at: parse_time(&fields, "created_at")?,
        }))
    }

    async fn delete_access_token(&self, token: &str) -> Result<(), CacheError> {
        self.delete(&cache_key::access_token(token)).await
    }

    async fn put_refresh_token(
        &self,
        record: &RefreshTokenRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let fields = [
            ("id", record.id.0.to_string()),
            ("client_id", record.client_id.to_string()),
            ("access_token_id", record.access_token_id.0.to_string()),
            ("expired_at", record.expires_at.timestamp_millis().to_string()),
            ("created_at", record.created_at.timestamp_millis().to_string()),
        ];
        self.put_hash(&cache_key::refresh_token(&record.token), &fields, ttl)
            .await
    }

    async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, CacheError> {
        let Some(fields) = self.get_hash(&cache_key::refresh_token(token)).await? else {
            return Ok(None);
        };
        Ok(Some(RefreshTokenRecord {
            id: TokenRowId(parse_u64(&fields, "id")?),
            client_id: ClientId::from(field(&fields, "client_id")?),
            token: token.to_owned(),
            access_token_id: TokenRowId(parse_u64(&fields, "access_token_id")?),
            expires_at: parse_time(&fields, "expired_at")?,
            created_at: parse_time(&fields, "created_at")?,
        }))
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), CacheError> {
        self.delete(&cache_key::refresh_token(token)).await
    }

    async fn set_blacklisted(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        let Some(ms) = ttl_millis(ttl) else {
            return Ok(());
        };
        let mut conn = self.conn.clone();
        self.run(conn.pset_ex::<_, _, ()>(cache_key::blacklist(token), "1", ms))
            .await
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        self.run(conn.exists(cache_key::blacklist(token))).await
    }

    async fn put_session(&self, session: &SessionData, ttl: Duration) -> Result<(), CacheError> {
        let Some(ms) = ttl_millis(ttl) else {
            return Ok(());
        };
        let json =
            serde_json::to_string(session).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        let mut conn = self.conn.clone();
        self.run(conn.pset_ex::<_, _, ()>(
            cache_key::session(&session.client_id, &session.token),
            json,
            ms,
        ))
        .await
    }

    async fn get_session(
        &self,
        client_id: &ClientId,
        token: &str,
    ) -> Result<Option<SessionData>, CacheError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = self
            .run(conn.get(cache_key::session(client_id, token)))
            .await?;
        json.map(|j| serde_json::from_str(&j).map_err(|e| CacheError::Corrupt(e.to_string())))
            .transpose()
    }

    async fn list_sessions(&self, client_id: &ClientId) -> Result<Vec<SessionData>, CacheError> {
        let pattern = format!("{}*", cache_key::session_prefix(client_id));
        let keys = self.scan_keys(&pattern).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = self
            .run(redis::cmd("MGET").arg(&keys).query_async(&mut conn))
            .await?;

        // Entries that expired between SCAN and MGET, or fail to decode, are skipped.
        Ok(values
            .into_iter()
            .flatten()
            .filter_map(|json| serde_json::from_str(&json).ok())
            .collect())
    }

    async fn delete_session(&self, client_id: &ClientId, token: &str) -> Result<(), CacheError> {
        self.delete(&cache_key::session(client_id, token)).await
    }

    async fn put_client(
        &self,
        client: &ClientWithSecrets,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let c = &client.client;
        let fields = [
            ("name", c.name.clone()),
            ("email", c.email.clone()),
            ("is_active", if c.is_active { "1" } else { "0" }.to_string()),
            ("description", c.description.clone()),
            ("created_at", c.created_at.timestamp_millis().to_string()),
            ("secret", client.secrets.secret.clone()),
            ("secondary_secret", client.secrets.secondary_secret.clone()),
        ];
        self.put_hash(&cache_key::client(&c.client_id), &fields, ttl)
            .await
    }

    async fn get_client(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<ClientWithSecrets>, CacheError> {
        let Some(fields) = self.get_hash(&cache_key::client(client_id)).await? else {
            return Ok(None);
        };
        Ok(Some(ClientWithSecrets {
            client: Client {
                client_id: client_id.clone(),
                name: field(&fields, "name")?.to_owned(),
                email: field(&fields, "email")?.to_owned(),
                is_active: parse_bool(&fields, "is_active")?,
                description: field(&fields, "description")?.to_owned(),
                created_at: parse_time(&fields, "created_at")?,
            },
            secrets: SecretPair {
                secret: field(&fields, "secret")?.to_owned(),
                secondary_secret: field(&fields, "secondary_secret")?.to_owned(),
            },
        }))
    }

    async fn incr_window_counter(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        let ms = ttl_millis(window).unwrap_or(1);
        let mut conn = self.conn.clone();
        let count: i64 = self
            .run(
                self.window_incr
                    .key(key)
                    .arg(ms)
                    .invoke_async(&mut conn),
            )
            .await?;
        u64::try_from(count).map_err(|_| CacheError::Corrupt(format!("negative counter at {key}")))
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = self
            .run(redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}
