//! Pictogram cache maintenance service
//!
//! Runs eviction with the configured policy on an interval and persists access times.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::store::{CacheStore, EvictionPolicy, EvictionStats};
use crate::config::CacheConfig;
use crate::utils::format_memory;

pub struct CacheMaintenanceService {
    cache: Arc<CacheStore>,
    policy: EvictionPolicy,
    interval: Duration,
}

impl CacheMaintenanceService {
    pub fn new(cache: Arc<CacheStore>, config: &CacheConfig) -> Self {
        Self {
            cache,
            policy: EvictionPolicy {
                max_bytes: config.max_size_bytes(),
                max_age: Some(config.max_age),
            },
            interval: config.maintenance_interval,
        }
    }

    #[must_use]
    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Run one maintenance pass: eviction, then an access-time flush.
    pub async fn execute_maintenance(&self) -> EvictionStats {
        let stats = self.cache.evict(self.policy).await;

        if let Err(e) = self.cache.flush().await {
            warn!("Failed to flush pictogram access times: {}", e);
        }

        info!(
            "Pictogram cache maintenance completed: kept={} removed_age={} removed_size={} freed={} duration={}ms",
            stats.kept_entries,
            stats.removed_by_age,
            stats.removed_by_size,
            format_memory(stats.bytes_freed as f64),
            stats.duration_ms
        );
        stats
    }

    /// Run maintenance every interval until `shutdown` fires. The first pass runs immediately.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Pictogram cache maintenance stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.execute_maintenance().await;
                    }
                }
            }
        })
    }
}
