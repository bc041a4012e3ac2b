// # TTL Cache
//
// The authoritative set of banned addresses.
//
// ## Contract
//
// - Every entry carries an optional expiry; entries without one never expire.
// - Expired entries are invisible: `get`, `contains`, `ttl` and `items` skip
//   them even before `purge_expired` physically removes them.
// - Safe for concurrent use; reads (sync enumeration) and writes (decision
//   merging) are not serialized with device sessions.
//
// Time comes from `tokio::time::Instant`, so paused-clock tests control
// expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// One banned address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Canonical address (IPv6 as `/128`)
    pub address: String,
    /// Comment pushed to the device
    pub annotation: String,
    /// Expiry instant, `None` for entries without a TTL
    pub expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Remaining lifetime; zero for entries without expiry
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }
}

/// Running cache counters
#[derive(Debug, Default)]
struct CacheCounters {
    insertions: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Point-in-time copy of the cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries created for an address not present before
    pub insertions: u64,
    /// Lookups that found a live entry
    pub hits: u64,
    /// Lookups that found nothing (or only an expired entry)
    pub misses: u64,
    /// Entries removed because they expired
    pub evictions: u64,
}

/// Thread-safe address cache with per-entry expiry
///
/// Cloning is cheap and yields a handle to the same cache.
///
/// # Example
///
/// ```rust,no_run
/// use banlist_core::cache::TtlCache;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let cache = TtlCache::new();
///     cache.set("1.2.3.4", "crowdsec ssh-bf ip", Some(Duration::from_secs(3600))).await;
///     assert!(cache.contains("1.2.3.4").await);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TtlCache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    counters: Arc<CacheCounters>,
}

impl TtlCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an entry
    ///
    /// `ttl` of `None` or zero stores the entry without expiry. An existing
    /// entry is fully replaced, including its expiry.
    pub async fn set(&self, address: impl Into<String>, annotation: impl Into<String>, ttl: Option<Duration>) {
        let address = address.into();
        let now = Instant::now();
        let expires_at = ttl.filter(|d| !d.is_zero()).map(|d| now + d);

        let mut guard = self.inner.write().await;
        let previous = guard.insert(
            address.clone(),
            CacheEntry {
                address,
                annotation: annotation.into(),
                expires_at,
            },
        );
        if previous.is_none_or(|entry| entry.is_expired_at(now)) {
            self.counters.insertions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Look up a live entry, counting a hit or miss
    pub async fn get(&self, address: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let guard = self.inner.read().await;
        match guard.get(address) {
            Some(entry) if !entry.is_expired_at(now) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            _ => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Check for a live entry without touching the counters
    pub async fn contains(&self, address: &str) -> bool {
        let now = Instant::now();
        let guard = self.inner.read().await;
        guard.get(address).is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Remaining TTL of a live entry (zero for entries without expiry)
    pub async fn ttl(&self, address: &str) -> Option<Duration> {
        let now = Instant::now();
        let guard = self.inner.read().await;
        guard
            .get(address)
            .filter(|entry| !entry.is_expired_at(now))
            .map(CacheEntry::remaining_ttl)
    }

    /// Delete an entry; returns whether a live entry was removed
    pub async fn delete(&self, address: &str) -> bool {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        guard
            .remove(address)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Snapshot of all live entries, ordered by address
    pub async fn items(&self) -> Vec<CacheEntry> {
        let now = Instant::now();
        let guard = self.inner.read().await;
        let mut items: Vec<CacheEntry> = guard
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.address.cmp(&b.address));
        items
    }

    /// Physically remove expired entries; returns how many were evicted
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired_at(now));
        let evicted = before - guard.len();
        self.counters
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        evicted
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let guard = self.inner.read().await;
        guard.values().filter(|entry| !entry.is_expired_at(now)).count()
    }

    /// Check if there are no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Current counter values
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            insertions: self.counters.insertions.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}
