use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::{Backend, Storage};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;

/// The storage pair every service is built over, plus the pool so it can be
/// closed on shutdown.
pub struct Backends {
    pub store: Arc<dyn TokenStore>,
    pub cache: Arc<dyn TokenCache>,
    pub clock: Arc<dyn Clock>,
    pub pool: Option<MySqlPool>,
}

impl Backends {
    pub async fn connect(storage: &Storage) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        match storage.backend {
            Backend::Memory => {
                warn!("memory storage backend selected, nothing survives a restart");
                Ok(Self::memory(clock))
            }
            Backend::Real => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(storage.max_connections)
                    .acquire_timeout(storage.op_timeout())
                    .connect(&storage.mysql_dsn)
                    .await?;
                let redis_client = redis::Client::open(storage.redis_dsn.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;

                info!(
                    max_connections = storage.max_connections,
                    op_timeout_ms = storage.op_timeout_ms,
                    "connected to mysql and redis"
                );

                Ok(Self {
                    store: Arc::new(MySqlTokenStore::new(pool.clone(), storage.op_timeout())),
                    cache: Arc::new(RedisTokenCache::new(redis_manager, storage.op_timeout())),
                    clock,
                    pool: Some(pool),
                })
            }
        }
    }

    pub fn memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(MemoryTokenStore::new()),
            cache: Arc::new(MemoryTokenCache::new(clock.clone())),
            clock,
            pool: None,
        }
    }
}
