//! Merging decisions into the cache

use std::cmp::Ordering;

use chrono::TimeDelta;
use tracing::{debug, info};

use super::{Reconciler, SyncReport};
use crate::decision::{Decision, DecisionBatch};
use crate::duration::{format_delta, parse_or_default};
use crate::metrics::DecisionOperation;
use crate::protocol::{Protocol, canonical_address};

/// Summary of one processed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Additions that changed the cache
    pub added: usize,
    /// Removals that changed the cache
    pub removed: usize,
    /// Report of the eager sync, if one ran
    pub synced: Option<SyncReport>,
}

impl Reconciler {
    /// Apply one ban decision
    ///
    /// The decision always overwrites a cached entry for the same address,
    /// whether it extends or shortens the TTL.
    ///
    /// # Returns
    ///
    /// `false` only when the address family is disabled.
    pub async fn apply_add(&self, decision: &Decision) -> bool {
        let config = &self.inner.config;
        let metrics = &self.inner.metrics;

        let default_ttl = TimeDelta::from_std(config.default_ttl).unwrap_or(TimeDelta::MAX);
        let ttl = parse_or_default(&decision.duration, default_ttl);
        let proto = Protocol::of(&decision.address);

        info!(
            address = %decision.address,
            duration = %decision.duration,
            origin = %decision.origin,
            scenario = %decision.scenario,
            scope = %decision.scope,
            "Processing decision to add"
        );

        if !config.protocol_enabled(proto) {
            debug!(address = %decision.address, %proto, "Skipping, protocol family disabled");
            metrics.decision(proto, "add", DecisionOperation::Skip);
            return false;
        }

        let address = canonical_address(&decision.address);
        let operation = match self.inner.cache.get(&address).await {
            Some(entry) => {
                metrics.cache_lookup("add", true);
                let current = TimeDelta::from_std(entry.remaining_ttl()).unwrap_or(TimeDelta::MAX);
                info!(
                    %address,
                    current_ttl = %format_delta(current),
                    new_ttl = %format_delta(ttl),
                    "Address is in the cache, updating"
                );
                match ttl.cmp(&current) {
                    Ordering::Equal => DecisionOperation::UpdateEqual,
                    Ordering::Greater => DecisionOperation::UpdateExtend,
                    Ordering::Less => DecisionOperation::UpdateShorten,
                }
            }
            None => {
                metrics.cache_lookup("add", false);
                info!(%address, new_ttl = %format_delta(ttl), "Address not in cache, adding");
                DecisionOperation::Insert
            }
        };
        metrics.decision(proto, "add", operation);

        // Non-positive TTLs are stored without expiry
        let expiry = ttl.to_std().ok().filter(|d| !d.is_zero());
        self.inner
            .cache
            .set(address, decision.annotation(), expiry)
            .await;
        true
    }

    /// Apply one unban decision
    ///
    /// # Returns
    ///
    /// `true` if a cached entry was deleted.
    pub async fn apply_remove(&self, decision: &Decision) -> bool {
        let metrics = &self.inner.metrics;
        let proto = Protocol::of(&decision.address);

        info!(
            address = %decision.address,
            origin = %decision.origin,
            scenario = %decision.scenario,
            scope = %decision.scope,
            "Processing decision to remove"
        );

        if !self.inner.config.protocol_enabled(proto) {
            debug!(address = %decision.address, %proto, "Skipping, protocol family disabled");
            metrics.decision(proto, "remove", DecisionOperation::Skip);
            return false;
        }

        let address = canonical_address(&decision.address);
        if self.inner.cache.delete(&address).await {
            metrics.cache_lookup("del", true);
            metrics.decision(proto, "remove", DecisionOperation::Remove);
            info!(%address, "Address is in the cache, removed");
            true
        } else {
            metrics.cache_lookup("del", false);
            metrics.decision(proto, "remove", DecisionOperation::NoOp);
            info!(%address, "Address not in cache, nothing to do");
            false
        }
    }

    /// Merge a batch and, if it changed anything, sync eagerly
    ///
    /// Removals are applied before additions, so an address both removed and
    /// added in one batch ends up banned.
    pub async fn process_batch(&self, batch: &DecisionBatch) -> BatchOutcome {
        let cap = self.inner.config.debug_decisions_max;

        let mut removed = 0;
        for decision in &batch.removed {
            if self.apply_remove(decision).await {
                removed += 1;
            }
            if cap.is_some_and(|max| removed >= max) {
                debug!(removed, "Debug decision cap reached for removals");
                break;
            }
        }

        let mut added = 0;
        for decision in &batch.added {
            if self.apply_add(decision).await {
                added += 1;
            }
            if cap.is_some_and(|max| added >= max) {
                debug!(added, "Debug decision cap reached for additions");
                break;
            }
        }

        let synced = if self.inner.config.trigger_on_update && (added > 0 || removed > 0) {
            info!(added, removed, "Decision changes detected, syncing device now");
            Some(self.sync_device().await)
        } else {
            None
        };

        BatchOutcome {
            added,
            removed,
            synced,
        }
    }
}
