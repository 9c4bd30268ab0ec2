use crate::application_impl::*;
use crate::application_port::*;
use crate::logger::*;
use crate::server::*;
use crate::settings::Settings;
use sqlx::MySqlPool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub lifetimes: TokenLifetimes,
    pub reaper_interval: Duration,
    pub request_timeout: Duration,
}

impl From<&Settings> for ServerConfig {
    fn from(settings: &Settings) -> Self {
        ServerConfig {
            lifetimes: TokenLifetimes {
                access: Duration::from_secs(settings.token.access_ttl_secs),
                refresh: Duration::from_secs(settings.token.refresh_ttl_secs),
            },
            reaper_interval: settings.reaper.interval(),
            request_timeout: settings.http.request_timeout(),
        }
    }
}

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub request_timeout: Duration,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pool: Option<MySqlPool>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let backends = Backends::connect(&settings.storage).await?;
        Ok(Self::with_backends(backends, ServerConfig::from(settings)))
    }

    /// Wires services over already-connected backends and starts the reaper.
    /// Must be called inside a tokio runtime.
    pub fn with_backends(backends: Backends, config: ServerConfig) -> Self {
        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            backends.store.clone(),
            backends.cache.clone(),
            backends.clock.clone(),
            config.lifetimes,
        ));
        let rate_limiter: Arc<dyn RateLimiter> =
            Arc::new(CacheRateLimiter::new(backends.cache.clone()));

        let cancel = CancellationToken::new();
        let reaper = TokenReaper::new(
            backends.store,
            backends.clock,
            config.reaper_interval,
            cancel.clone(),
        );
        let reaper_handle = tokio::spawn(async move {
            reaper.run().await;
        });

        info!(
            access_ttl_secs = config.lifetimes.access.as_secs(),
            refresh_ttl_secs = config.lifetimes.refresh.as_secs(),
            "server started"
        );

        Self {
            auth_service,
            rate_limiter,
            request_timeout: config.request_timeout,
            reaper_handle: Mutex::new(Some(reaper_handle)),
            cancel,
            pool: backends.pool,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.reaper_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("reaper handle dropped: {:?}", r);
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
