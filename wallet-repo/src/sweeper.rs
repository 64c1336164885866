//! Background soft-deletion of wallets nobody has touched for a while.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use wallet_types::{LedgerStore, RepoError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweeperConfig {
    /// Time between sweeps
    pub interval: Duration,
    /// Wallets not updated for longer than this are soft-deleted
    pub retention: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            retention: Duration::from_secs(365 * 24 * 60 * 60),
        }
    }
}

pub struct StaleWalletSweeper<S> {
    store: S,
    config: SweeperConfig,
}

impl<S: LedgerStore> StaleWalletSweeper<S> {
    pub fn new(store: S, config: SweeperConfig) -> Self {
        Self { store, config }
    }

    /// Sweeps every `interval` until `shutdown` flips to `true` or its sender
    /// is dropped. The first sweep runs immediately.
    #[instrument(skip_all)]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            retention_secs = self.config.retention.as_secs(),
            "Starting stale wallet sweeper"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.sweep_once().await {
                Ok(0) => debug!("No stale wallets"),
                Ok(swept) => info!(swept, "Soft-deleted stale wallets"),
                Err(e) => error!(error = %e, "Stale wallet sweep failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("Stale wallet sweeper stopped");
    }

    /// Runs a single sweep and returns how many wallets were soft-deleted.
    pub async fn sweep_once(&self) -> Result<u64, RepoError> {
        let retention = chrono::Duration::from_std(self.config.retention)
            .map_err(|e| RepoError::Database(format!("Retention out of range: {}", e)))?;
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .ok_or_else(|| RepoError::Database("Retention reaches before the epoch range".into()))?;
        self.store.sweep_stale_wallets(cutoff).await
    }
}
