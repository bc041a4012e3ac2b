//! Decision reconciliation engine
//!
//! The [`Reconciler`] owns the TTL cache of banned addresses and keeps the
//! firewall device's address lists in line with it.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ DecisionFeed │─── DecisionBatch ───┐
//! └──────────────┘                     │
//!                                      ▼
//!                             ┌──────────────┐     ┌──────────────┐
//!                             │  Reconciler  │────▶│   TtlCache   │
//!                             └──────────────┘     └──────────────┘
//!                                      │
//!            eager (after a batch)     │     periodic (update_interval)
//!                         └────────────┼────────────┘
//!                                      ▼
//!                             ┌──────────────┐
//!                             │ sync_device  │  (one at a time)
//!                             └──────────────┘
//!                                      │
//!                                      ▼
//!                            ┌─────────────────┐
//!                            │ DeviceConnector │
//!                            └─────────────────┘
//! ```
//!
//! ## Event Flow
//!
//! 1. A batch arrives; removals are merged into the cache, then additions
//! 2. If anything changed and eager triggering is on, the device is synced
//! 3. Independently, the device is synced every `update_interval`
//! 4. A sync writes every live entry into a fresh snapshot list and repoints
//!    the configured firewall rules at it

mod merger;
mod sync;

pub use merger::BatchOutcome;
pub use sync::{SyncOutcome, SyncReport, snapshot_list_name};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, error, info};

use crate::cache::TtlCache;
use crate::config::ReconcilerConfig;
use crate::duration::format_duration;
use crate::error::{Error, Result};
use crate::metrics::ReconcilerMetrics;
use crate::traits::{DecisionFeed, DeviceConnector};

/// How often expired entries are purged and the cache gauges refreshed
pub const CACHE_STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Core reconciliation engine
///
/// Cloning yields another handle to the same engine; the periodic sync task
/// holds one.
///
/// ## Lifecycle
///
/// 1. Create with [`Reconciler::new()`]
/// 2. Start with [`Reconciler::run()`] or [`Reconciler::run_with_shutdown()`]
/// 3. Runs until shutdown or until the feed ends
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Inner>,
}

struct Inner {
    feed: Box<dyn DecisionFeed>,
    connector: Box<dyn DeviceConnector>,
    config: ReconcilerConfig,
    cache: TtlCache,
    metrics: ReconcilerMetrics,
    /// Serializes device syncs; holds the last snapshot list name
    sync_lock: Mutex<sync::SyncState>,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(
        feed: Box<dyn DecisionFeed>,
        connector: Box<dyn DeviceConnector>,
        config: ReconcilerConfig,
        metrics: ReconcilerMetrics,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(Inner {
                feed,
                connector,
                config,
                cache: TtlCache::new(),
                metrics,
                sync_lock: Mutex::new(sync::SyncState::default()),
            }),
        })
    }

    /// The address cache
    pub fn cache(&self) -> &TtlCache {
        &self.inner.cache
    }

    /// The metrics handle
    pub fn metrics(&self) -> &ReconcilerMetrics {
        &self.inner.metrics
    }

    /// The configuration
    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }

    /// Run until Ctrl-C
    ///
    /// # Returns
    ///
    /// - `Ok(())`: clean shutdown
    /// - `Err(Error::FeedClosed)`: the decision stream ended
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run until `shutdown_rx` fires (or is dropped)
    ///
    /// With `None` this behaves like [`Reconciler::run()`].
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        let config = &self.inner.config;
        info!(
            feed = self.inner.feed.feed_name(),
            device = self.inner.connector.host(),
            address_list = %config.address_list,
            update_interval = %format_duration(config.update_interval),
            trigger_on_update = config.trigger_on_update,
            "Reconciler started"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let maintenance = self.spawn_cache_maintenance(stop_rx.clone());
        let periodic = self.spawn_periodic_sync(stop_rx);

        let mut batches = self.inner.feed.watch();

        let shutdown = async {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to wait for Ctrl-C: {}", e);
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                batch = batches.next() => match batch {
                    Some(batch) => {
                        let outcome = self.process_batch(&batch).await;
                        debug!(
                            added = outcome.added,
                            removed = outcome.removed,
                            synced = outcome.synced.is_some(),
                            "Batch processed"
                        );
                    }
                    None => {
                        error!("Decision feed closed");
                        break Err(Error::FeedClosed);
                    }
                },

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break Ok(());
                }
            }
        };

        let _ = stop_tx.send(true);
        if let Err(e) = periodic.await {
            error!("Periodic sync task failed: {}", e);
        }
        if let Err(e) = maintenance.await {
            error!("Cache maintenance task failed: {}", e);
        }
        info!("Reconciler stopped");

        result
    }

    /// Spawn the periodic sync task
    ///
    /// Syncs the device every `update_interval`. A sync in progress when
    /// `stop` fires runs to completion.
    fn spawn_periodic_sync(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let interval = this.inner.config.update_interval;
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.changed() => break,
                }

                this.sync_device().await;
            }
            debug!("Periodic sync stopped");
        })
    }

    /// Spawn the cache maintenance task
    ///
    /// Every [`CACHE_STATS_INTERVAL`] it purges expired entries and mirrors
    /// the cache counters into the `banlist_ttlcache_stats` gauges. The
    /// first round runs immediately.
    fn spawn_cache_maintenance(&self, mut stop: watch::Receiver<bool>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CACHE_STATS_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stop.changed() => break,
                }

                let evicted = this.inner.cache.purge_expired().await;
                if evicted > 0 {
                    debug!(evicted, "Expired cache entries purged");
                }
                this.inner.metrics.set_cache_stats(this.inner.cache.stats());
            }
            debug!("Cache maintenance stopped");
        })
    }
}
