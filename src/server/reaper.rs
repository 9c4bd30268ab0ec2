use crate::domain_model::PurgeCounts;
use crate::domain_port::*;
use crate::logger::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodically deletes expired access and refresh token rows.
pub struct TokenReaper {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl TokenReaper {
    pub fn new(
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            store,
            clock,
            interval,
            cancellation_token,
        }
    }

    pub async fn tick_once(&self) -> Result<PurgeCounts, StoreError> {
        let counts = self.store.delete_expired(self.clock.now()).await?;
        info!(
            access_tokens = counts.access_tokens,
            refresh_tokens = counts.refresh_tokens,
            "expired tokens purged"
        );
        Ok(counts)
    }

    /// First pass runs immediately. A running pass is never interrupted;
    /// cancellation is observed between passes.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "token reaper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    info!("token reaper shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once().await {
                        error!(error = %e, "token reaper pass failed");
                    }
                }
            }
        }
    }
}
