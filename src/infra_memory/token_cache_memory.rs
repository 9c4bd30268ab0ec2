use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock time between sweeps of expired entries, run on write.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum Value {
    Access(AccessTokenRecord),
    Refresh(RefreshTokenRecord),
    Flag,
    Session(SessionData),
    Client(ClientWithSecrets),
    Counter(u64),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

/// Process-local [`TokenCache`] keyed exactly like the Redis backend.
///
/// Expiry follows the injected [`Clock`], so tests can move time instead of
/// sleeping. `set_available(false)` simulates an outage.
///
/// A read drops the expired entry it lands on. Keys nobody reads again
/// (rate-limit counters, blacklist flags) are dropped by a periodic sweep.
pub struct MemoryTokenCache {
    entries: DashMap<String, Entry>,
    #[cfg(test)]
    writes: DashMap<String, u64>,
    clock: Arc<dyn Clock>,
    available: AtomicBool,
    next_sweep: Mutex<DateTime<Utc>>,
}

impl MemoryTokenCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let next_sweep = clock.now() + SWEEP_INTERVAL;
        MemoryTokenCache {
            entries: DashMap::new(),
            #[cfg(test)]
            writes: DashMap::new(),
            clock,
            available: AtomicBool::new(true),
            next_sweep: Mutex::new(next_sweep),
        }
    }

    /// Entries held right now, including expired ones not yet swept.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Whether a live entry exists under `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.live(key).is_some()
    }

    /// Remaining lifetime of the entry under `key`.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.live(key)?;
        remaining_until(entry.expires_at, self.clock.now())
    }

    /// Number of times `key` has been written.
    #[cfg(test)]
    pub fn write_count(&self, key: &str) -> u64 {
        self.writes.get(key).map(|n| *n).unwrap_or(0)
    }

    fn ensure_available(&self) -> Result<(), CacheError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("memory cache switched off".to_string()))
        }
    }

    fn put(&self, key: String, value: Value, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_available()?;
        let now = self.clock.now();
        self.sweep_expired(now);
        #[cfg(test)]
        {
            *self.writes.entry(key.clone()).or_insert(0) += 1;
        }
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    /// Must not be called while holding a reference into `entries`.
    fn sweep_expired(&self, now: DateTime<Utc>) {
        {
            let Ok(mut next) = self.next_sweep.lock() else {
                return;
            };
            if now < *next {
                return;
            }
            *next = now + SWEEP_INTERVAL;
        }
        self.entries.retain(|_, e| e.expires_at > now);
        #[cfg(test)]
        self.writes.retain(|key, _| self.entries.contains_key(key));
    }

    fn live(&self, key: &str) -> Option<Entry> {
        let now = self.clock.now();
        let entry = self.entries.get(key).map(|e| e.clone())?;
        if entry.expires_at <= now {
            self.entries.remove_if(key, |_, e| e.expires_at <= now);
            return None;
        }
        Some(entry)
    }

    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        self.ensure_available()?;
        Ok(self.live(key).map(|e| e.value))
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.ensure_available()?;
        self.entries.remove(key);
        Ok(())
    }
}

fn unexpected(key: &str) -> CacheError {
    CacheError::Corrupt(format!("unexpected value type at {key}"))
}

#[async_trait::async_trait]
impl TokenCache for MemoryTokenCache {
    async fn put_access_token(
        &self,
        record: &AccessTokenRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.put(
            cache_key::access_token(&record.token),
            Value::Access(record.clone()),
            ttl,
        )
    }

    async fn get_access_token(&self, token: &str) -> Result<Option<AccessTokenRecord>, CacheError> {
        let key = cache_key::access_token(token);
        match self.get(&key)? {
            None => Ok(None),
            Some(Value::Access(record)) => Ok(Some(record)),
            Some(_) => Err(unexpected(&key)),
        }
    }

    async fn delete_access_token(&self, token: &str) -> Result<(), CacheError> {
        self.delete(&cache_key::access_token(token))
    }

    async fn put_refresh_token(
        &self,
        record: &RefreshTokenRecord,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.put(
            cache_key::refresh_token(&record.token),
            Value::Refresh(record.clone()),
            ttl,
        )
    }

    async fn get_refresh_token(
        &self,
        token: &str,
    ) -> Result<Option<RefreshTokenRecord>, CacheError> {
        let key = cache_key::refresh_token(token);
        match self.get(&key)? {
            None => Ok(None),
            Some(Value::Refresh(record)) => Ok(Some(record)),
            Some(_) => Err(unexpected(&key)),
        }
    }

    async fn delete_refresh_token(&self, token: &str) -> Result<(), CacheError> {
        self.delete(&cache_key::refresh_token(token))
    }

    async fn set_blacklisted(&self, token: &str, ttl: Duration) -> Result<(), CacheError> {
        self.put(cache_key::blacklist(token), Value::Flag, ttl)
    }

    async fn is_blacklisted(&self, token: &str) -> Result<bool, CacheError> {
        Ok(self.get(&cache_key::blacklist(token))?.is_some())
    }

    async fn put_session(&self, session: &SessionData, ttl: Duration) -> Result<(), CacheError> {
        self.put(
            cache_key::session(&session.client_id, &session.token),
            Value::Session(session.clone()),
            ttl,
        )
    }

    async fn get_session(
        &self,
        client_id: &ClientId,
        token: &str,
    ) -> Result<Option<SessionData>, CacheError> {
        let key = cache_key::session(client_id, token);
        match self.get(&key)? {
            None => Ok(None),
            Some(Value::Session(session)) => Ok(Some(session)),
            Some(_) => Err(unexpected(&key)),
        }
    }

    async fn list_sessions(&self, client_id: &ClientId) -> Result<Vec<SessionData>, CacheError> {
        self.ensure_available()?;
        let prefix = cache_key::session_prefix(client_id);
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(&prefix))
            .map(|e| e.key().clone())
            .collect();

        Ok(keys
            .iter()
            .filter_map(|key| match self.live(key)?.value {
                Value::Session(session) => Some(session),
                _ => None,
            })
            .collect())
    }

    async fn delete_session(&self, client_id: &ClientId, token: &str) -> Result<(), CacheError> {
        self.delete(&cache_key::session(client_id, token))
    }

    async fn put_client(
        &self,
        client: &ClientWithSecrets,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.put(
            cache_key::client(&client.client.client_id),
            Value::Client(client.clone()),
            ttl,
        )
    }

    async fn get_client(
        &self,
        client_id: &ClientId,
    ) -> Result<Option<ClientWithSecrets>, CacheError> {
        let key = cache_key::client(client_id);
        match self.get(&key)? {
            None => Ok(None),
            Some(Value::Client(client)) => Ok(Some(client)),
            Some(_) => Err(unexpected(&key)),
        }
    }

    async fn incr_window_counter(&self, key: &str, window: Duration) -> Result<u64, CacheError> {
        self.ensure_available()?;
        let now = self.clock.now();
        self.sweep_expired(now);
        let fresh = || Entry {
            value: Value::Counter(0),
            expires_at: now + window,
        };

        // The shard lock is held for the whole read-modify-write.
        let mut entry = self.entries.entry(key.to_owned()).or_insert_with(fresh);
        if entry.expires_at <= now || !matches!(entry.value, Value::Counter(_)) {
            *entry = fresh();
        }
        match &mut entry.value {
            Value::Counter(count) => {
                *count += 1;
                Ok(*count)
            }
            _ => Err(unexpected(key)),
        }
    }

    async fn ping(&self) -> Result<(), CacheError> {
        self.ensure_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::ManualClock;

    fn cache() -> (Arc<ManualClock>, MemoryTokenCache) {
        let clock = Arc::new(ManualClock::default());
        let cache = MemoryTokenCache::new(clock.clone());
        (clock, cache)
    }

    #[tokio::test]
    async fn entries_expire_with_the_clock() {
        let (clock, cache) = cache();
        cache
            .set_blacklisted("tok", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(cache.is_blacklisted("tok").await.unwrap());

        clock.advance(Duration::from_secs(10));
        assert!(!cache.is_blacklisted("tok").await.unwrap());
        assert!(!cache.contains_key("blacklist:token:tok"));
    }

    #[tokio::test]
    async fn window_counter_resets_after_window() {
        let (clock, cache) = cache();
        let window = Duration::from_secs(60);
        for expected in 1..=3 {
            assert_eq!(cache.incr_window_counter("k", window).await.unwrap(), expected);
        }

        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.incr_window_counter("k", window).await.unwrap(), 4);

        // Incrementing does not push the deadline out.
        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.incr_window_counter("k", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unread_expired_keys_are_swept_on_write() {
        let (clock, cache) = cache();
        for n in 0..2_000 {
            let ip = format!("10.0.{}.{}", n / 256, n % 256);
            cache
                .incr_window_counter(&format!("ratelimit:api:{ip}"), Duration::from_secs(60))
                .await
                .unwrap();
            cache
                .set_blacklisted(&format!("tok-{n}"), Duration::from_secs(1))
                .await
                .unwrap();
        }
        assert_eq!(cache.entry_count(), 4_000);

        clock.advance(Duration::from_secs(60 * 60));
        cache
            .incr_window_counter("ratelimit:api:192.0.2.1", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(cache.entry_count(), 1);
        assert_eq!(cache.write_count("blacklist:token:tok-0"), 0);
    }

    #[tokio::test]
    async fn sweep_keeps_live_entries() {
        let (clock, cache) = cache();
        cache
            .set_blacklisted("short", Duration::from_secs(30))
            .await
            .unwrap();
        cache
            .set_blacklisted("long", Duration::from_secs(3_600))
            .await
            .unwrap();

        clock.advance(SWEEP_INTERVAL);
        cache
            .set_blacklisted("other", Duration::from_secs(10))
            .await
            .unwrap();

        assert_eq!(cache.entry_count(), 2);
        assert!(cache.is_blacklisted("long").await.unwrap());
    }

    #[tokio::test]
    async fn outage_surfaces_as_unavailable() {
        let (_clock, cache) = cache();
        cache.set_available(false);
        assert!(matches!(
            cache.is_blacklisted("tok").await,
            Err(CacheError::Unavailable(_))
        ));
        cache.set_available(true);
        assert!(!cache.is_blacklisted("tok").await.unwrap());
    }
}
