//! Prometheus metrics for the reconciler
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `banlist_decisions_total` | Counter | `proto`, `func`, `operation` |
//! | `banlist_cache_total` | Counter | `func`, `operation` |
//! | `banlist_truncated_ttl_total` | Counter | `proto`, `truncated` |
//! | `banlist_permanent_bans_total` | Counter | `proto` |
//! | `banlist_device_commands_total` | Counter | `proto`, `func`, `operation`, `result` |
//! | `banlist_lock_wait_microseconds_total` | Counter | |
//! | `banlist_sync_duration_microseconds_total` | Counter | |
//! | `banlist_sync_runs_total` | Counter | `outcome` |
//! | `banlist_ttlcache_stats` | Gauge | `operation` |
//!
//! All handles are cheap clones of the same underlying collectors, so the
//! engine and the `/metrics` endpoint can hold their own copies.

use std::time::Duration;

use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::cache::CacheStats;
use crate::error::{Error, Result};
use crate::protocol::Protocol;

/// Classification of a merged decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionOperation {
    /// New address
    Insert,
    /// Same TTL as the cached entry
    UpdateEqual,
    /// Longer TTL than the cached entry
    UpdateExtend,
    /// Shorter TTL than the cached entry
    UpdateShorten,
    /// Cached address removed
    Remove,
    /// Removal of an address not in the cache
    NoOp,
    /// Protocol family disabled
    Skip,
}

impl DecisionOperation {
    /// Metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOperation::Insert => "insert",
            DecisionOperation::UpdateEqual => "update_equal",
            DecisionOperation::UpdateExtend => "update_extend",
            DecisionOperation::UpdateShorten => "update_shorten",
            DecisionOperation::Remove => "remove",
            DecisionOperation::NoOp => "no_op",
            DecisionOperation::Skip => "skip",
        }
    }
}

/// Reconciler metrics registered with their own registry
#[derive(Clone)]
pub struct ReconcilerMetrics {
    registry: Registry,
    decisions_total: IntCounterVec,
    cache_total: IntCounterVec,
    truncated_ttl_total: IntCounterVec,
    permanent_bans_total: IntCounterVec,
    device_commands_total: IntCounterVec,
    lock_wait_us_total: IntCounter,
    sync_duration_us_total: IntCounter,
    sync_runs_total: IntCounterVec,
    ttlcache_stats: IntGaugeVec,
}

impl ReconcilerMetrics {
    /// Create all collectors and register them with a fresh registry
    ///
    /// # Errors
    ///
    /// Returns [`Error::Metrics`] if a collector fails to register.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let decisions_total = IntCounterVec::new(
            Opts::new("banlist_decisions_total", "Decisions applied to the cache"),
            &["proto", "func", "operation"],
        )?;
        registry.register(Box::new(decisions_total.clone()))?;

        let cache_total = IntCounterVec::new(
            Opts::new("banlist_cache_total", "Cache lookups by decisions"),
            &["func", "operation"],
        )?;
        registry.register(Box::new(cache_total.clone()))?;

        let truncated_ttl_total = IntCounterVec::new(
            Opts::new(
                "banlist_truncated_ttl_total",
                "Addresses pushed to the device, by whether the TTL was clamped",
            ),
            &["proto", "truncated"],
        )?;
        registry.register(Box::new(truncated_ttl_total.clone()))?;

        let permanent_bans_total = IntCounterVec::new(
            Opts::new(
                "banlist_permanent_bans_total",
                "Entries without TTL converted to an expiring ban",
            ),
            &["proto"],
        )?;
        registry.register(Box::new(permanent_bans_total.clone()))?;

        let device_commands_total = IntCounterVec::new(
            Opts::new("banlist_device_commands_total", "Commands sent to the device"),
            &["proto", "func", "operation", "result"],
        )?;
        registry.register(Box::new(device_commands_total.clone()))?;

        let lock_wait_us_total = IntCounter::new(
            "banlist_lock_wait_microseconds_total",
            "Time spent waiting for the sync lock",
        )?;
        registry.register(Box::new(lock_wait_us_total.clone()))?;

        let sync_duration_us_total = IntCounter::new(
            "banlist_sync_duration_microseconds_total",
            "Time spent in device sync runs",
        )?;
        registry.register(Box::new(sync_duration_us_total.clone()))?;

        let sync_runs_total = IntCounterVec::new(
            Opts::new("banlist_sync_runs_total", "Device sync runs by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(sync_runs_total.clone()))?;

        let ttlcache_stats = IntGaugeVec::new(
            Opts::new("banlist_ttlcache_stats", "TTL cache statistics"),
            &["operation"],
        )?;
        registry.register(Box::new(ttlcache_stats.clone()))?;

        Ok(Self {
            registry,
            decisions_total,
            cache_total,
            truncated_ttl_total,
            permanent_bans_total,
            device_commands_total,
            lock_wait_us_total,
            sync_duration_us_total,
            sync_runs_total,
            ttlcache_stats,
        })
    }

    /// Count a merged decision
    pub fn decision(&self, proto: Protocol, func: &str, operation: DecisionOperation) {
        self.decisions_total
            .with_label_values(&[proto.as_str(), func, operation.as_str()])
            .inc();
    }

    /// Count a cache lookup (`func` is `add`/`del`, `operation` is `hit`/`miss`)
    pub fn cache_lookup(&self, func: &str, hit: bool) {
        let operation = if hit { "hit" } else { "miss" };
        self.cache_total.with_label_values(&[func, operation]).inc();
    }

    /// Count an address pushed to the device
    pub fn ttl_pushed(&self, proto: Protocol, truncated: bool) {
        self.truncated_ttl_total
            .with_label_values(&[proto.as_str(), if truncated { "true" } else { "false" }])
            .inc();
    }

    /// Count an entry without TTL converted at sync
    pub fn permanent_ban_converted(&self, proto: Protocol) {
        self.permanent_bans_total
            .with_label_values(&[proto.as_str()])
            .inc();
    }

    /// Count a device command
    pub fn device_command(&self, proto: Protocol, func: &str, operation: &str, success: bool) {
        let result = if success { "success" } else { "error" };
        self.device_commands_total
            .with_label_values(&[proto.as_str(), func, operation, result])
            .inc();
    }

    /// Accumulate time waited for the sync lock
    pub fn add_lock_wait(&self, waited: Duration) {
        self.lock_wait_us_total.inc_by(waited.as_micros() as u64);
    }

    /// Accumulate sync run duration and count the run outcome
    pub fn sync_finished(&self, outcome: &str, elapsed: Duration) {
        self.sync_duration_us_total.inc_by(elapsed.as_micros() as u64);
        self.sync_runs_total.with_label_values(&[outcome]).inc();
    }

    /// Mirror the cache counters into gauges
    pub fn set_cache_stats(&self, stats: CacheStats) {
        for (operation, value) in [
            ("insertions", stats.insertions),
            ("hits", stats.hits),
            ("misses", stats.misses),
            ("evictions", stats.evictions),
        ] {
            self.ttlcache_stats
                .with_label_values(&[operation])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        }
    }

    /// Current value of `banlist_decisions_total`
    pub fn decision_count(&self, proto: Protocol, func: &str, operation: DecisionOperation) -> u64 {
        self.decisions_total
            .with_label_values(&[proto.as_str(), func, operation.as_str()])
            .get()
    }

    /// Current value of `banlist_truncated_ttl_total`
    pub fn ttl_pushed_count(&self, proto: Protocol, truncated: bool) -> u64 {
        self.truncated_ttl_total
            .with_label_values(&[proto.as_str(), if truncated { "true" } else { "false" }])
            .get()
    }

    /// Current value of `banlist_permanent_bans_total`
    pub fn permanent_ban_count(&self, proto: Protocol) -> u64 {
        self.permanent_bans_total
            .with_label_values(&[proto.as_str()])
            .get()
    }

    /// Current value of `banlist_ttlcache_stats`
    pub fn cache_stat(&self, operation: &str) -> i64 {
        self.ttlcache_stats.with_label_values(&[operation]).get()
    }

    /// Current value of `banlist_sync_runs_total`
    pub fn sync_run_count(&self, outcome: &str) -> u64 {
        self.sync_runs_total.with_label_values(&[outcome]).get()
    }

    /// Encode all metrics in the Prometheus text format
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| Error::Other(e.to_string()))
    }
}
