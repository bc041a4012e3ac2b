// # banlist-core
//
// Core library of the threat-intel decision to firewall reconciler.
//
// ## Architecture Overview
//
// - **DecisionFeed**: Trait for the source of ban/unban decision batches
// - **DeviceConnector / DeviceSession**: Traits for the firewall device API
// - **TtlCache**: Authoritative set of banned addresses with per-entry expiry
// - **Reconciler**: Merges decisions into the cache and pushes the cache to
//   the device as a fresh address list, periodically and after changes
// - **ReconcilerMetrics**: Prometheus collectors for all of the above
//
// ## Design Principles
//
// 1. **Push-only**: the local cache is ground truth; the device is never read
// 2. **Atomic swap**: each sync builds a new list, then repoints the rules
// 3. **One sync at a time**: periodic and eager syncs share one lock
// 4. **Library-First**: the daemon only wires configuration and collaborators

pub mod cache;
pub mod config;
pub mod decision;
pub mod duration;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod traits;

// Re-export core types for convenience
pub use cache::{CacheEntry, CacheStats, TtlCache};
pub use config::{DeviceConfig, ReconcilerConfig, RuleBinding};
pub use decision::{Decision, DecisionBatch};
pub use engine::{BatchOutcome, CACHE_STATS_INTERVAL, Reconciler, SyncOutcome, SyncReport};
pub use error::{Error, Result};
pub use metrics::{DecisionOperation, ReconcilerMetrics};
pub use protocol::{Direction, FirewallMode, Protocol};
pub use traits::{DecisionFeed, DeviceConnector, DeviceSession};
