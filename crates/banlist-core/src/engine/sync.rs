//! Address-list sync protocol
//!
//! Idle → lock acquired → connected → list populated → rules repointed → idle.
//! A connect failure or any failed add ends the run early; the next sync
//! starts over with a new list.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::Reconciler;
use crate::duration::format_duration;
use crate::protocol::{Direction, FirewallMode, Protocol};
use crate::traits::DeviceSession;

/// How a sync run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// List populated and rules repointed
    Completed,
    /// No session could be opened
    ConnectFailed,
    /// An address could not be added; rules were left alone
    AddFailed,
}

impl SyncOutcome {
    /// Metrics label
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Completed => "completed",
            SyncOutcome::ConnectFailed => "connect_failed",
            SyncOutcome::AddFailed => "add_failed",
        }
    }
}

/// Result of one sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Snapshot list written by this run
    pub list_name: String,
    /// How the run ended
    pub outcome: SyncOutcome,
    /// Addresses successfully added to the list
    pub addresses_pushed: usize,
    /// Rule repoints that failed
    pub repoint_failures: usize,
}

/// State guarded by the sync lock
#[derive(Debug, Default)]
pub(super) struct SyncState {
    last_list: Option<String>,
    collisions: u32,
}

impl SyncState {
    /// Return `candidate`, suffixed when it repeats the previous run's name
    fn unique_name(&mut self, candidate: String) -> String {
        let name = match &self.last_list {
            Some(last) if last.starts_with(&candidate) => {
                self.collisions += 1;
                format!("{}_{}", candidate, self.collisions)
            }
            _ => {
                self.collisions = 0;
                candidate
            }
        };
        self.last_list = Some(name.clone());
        name
    }
}

/// Snapshot list name: `<prefix>_<UTC %Y-%m-%d_%H-%M-%S>`
pub fn snapshot_list_name(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}", prefix, now.format("%Y-%m-%d_%H-%M-%S"))
}

impl Reconciler {
    /// Push the cache to the device
    ///
    /// Waits for any sync in progress. Failures are logged, counted and
    /// reported; they never propagate.
    pub async fn sync_device(&self) -> SyncReport {
        let metrics = &self.inner.metrics;

        let started = Instant::now();
        let mut state = self.inner.sync_lock.lock().await;
        metrics.add_lock_wait(started.elapsed());

        let list_name =
            state.unique_name(snapshot_list_name(&self.inner.config.address_list, Utc::now()));
        let report = self.sync_locked(list_name).await;
        drop(state);

        let elapsed = started.elapsed();
        metrics.sync_finished(report.outcome.as_str(), elapsed);
        info!(
            list_name = %report.list_name,
            outcome = report.outcome.as_str(),
            addresses = report.addresses_pushed,
            repoint_failures = report.repoint_failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "Device sync finished"
        );
        report
    }

    async fn sync_locked(&self, list_name: String) -> SyncReport {
        let connector = &self.inner.connector;
        let mut report = SyncReport {
            list_name,
            outcome: SyncOutcome::Completed,
            addresses_pushed: 0,
            repoint_failures: 0,
        };

        info!(host = connector.host(), "Connecting to device");
        let mut session = match connector.connect().await {
            Ok(session) => session,
            Err(e) => {
                error!(host = connector.host(), error = %e, "Connecting to device failed");
                report.outcome = SyncOutcome::ConnectFailed;
                return report;
            }
        };

        match self.populate_list(session.as_mut(), &report.list_name).await {
            Ok(pushed) => {
                report.addresses_pushed = pushed;
                report.repoint_failures = self.repoint_rules(session.as_mut(), &report.list_name).await;
            }
            Err(pushed) => {
                report.addresses_pushed = pushed;
                report.outcome = SyncOutcome::AddFailed;
            }
        }

        if let Err(e) = session.close().await {
            warn!(host = connector.host(), error = %e, "Closing device session failed");
        }
        report
    }

    /// Add every live entry to `list`
    ///
    /// `Err` carries the number of addresses added before the first failure.
    async fn populate_list(&self, session: &mut dyn DeviceSession, list: &str) -> Result<usize, usize> {
        let config = &self.inner.config;
        let metrics = &self.inner.metrics;
        let mut pushed = 0;

        for entry in self.inner.cache.items().await {
            let proto = Protocol::of(&entry.address);
            let remaining = entry.remaining_ttl();
            let (ttl, truncated) = pushed_ttl(
                remaining,
                config.update_interval,
                config.use_max_ttl.then_some(config.max_ttl),
            );

            if remaining.is_zero() {
                info!(
                    address = %entry.address,
                    ttl = %format_duration(config.update_interval * 2),
                    "Ban without TTL converted to expiring ban"
                );
                metrics.permanent_ban_converted(proto);
            }
            metrics.ttl_pushed(proto, truncated);

            match session
                .add_address_to_list(proto, list, &entry.address, ttl, &entry.annotation)
                .await
            {
                Ok(()) => {
                    metrics.device_command(proto, "address_list", "add", true);
                    debug!(
                        %proto,
                        list_name = %list,
                        address = %entry.address,
                        ttl = %format_duration(ttl),
                        ttl_truncated = truncated,
                        "Address added to device"
                    );
                    pushed += 1;
                }
                Err(e) => {
                    metrics.device_command(proto, "address_list", "add", false);
                    error!(
                        %proto,
                        list_name = %list,
                        address = %entry.address,
                        ttl = %format_duration(ttl),
                        ttl_truncated = truncated,
                        error = %e,
                        "Failed to add address to address list, aborting sync"
                    );
                    return Err(pushed);
                }
            }
        }

        Ok(pushed)
    }

    /// Point every configured rule at `list`; returns the number of failures
    async fn repoint_rules(&self, session: &mut dyn DeviceSession, list: &str) -> usize {
        let config = &self.inner.config;
        let metrics = &self.inner.metrics;
        let mut failures = 0;

        for proto in Protocol::ALL {
            if !config.protocol_enabled(proto) {
                debug!(%proto, list_name = %list, "Skipping rule update, protocol family disabled");
                continue;
            }
            for mode in FirewallMode::ALL {
                if !config.mode_enabled(mode) {
                    continue;
                }
                for direction in Direction::ALL {
                    let Some(ids) = config.rule_ids(proto, mode, direction) else {
                        debug!(%proto, %mode, %direction, "No rule ids configured, skipping");
                        continue;
                    };

                    match session
                        .set_rule_address_list(proto, mode, ids, direction, list)
                        .await
                    {
                        Ok(()) => {
                            metrics.device_command(proto, mode.as_str(), "set", true);
                            info!(
                                %proto,
                                %mode,
                                rules = %ids,
                                property = direction.list_property(),
                                list_name = %list,
                                "Firewall rules repointed"
                            );
                        }
                        Err(e) => {
                            metrics.device_command(proto, mode.as_str(), "set", false);
                            error!(
                                %proto,
                                %mode,
                                rules = %ids,
                                property = direction.list_property(),
                                list_name = %list,
                                error = %e,
                                "Failed to repoint firewall rules"
                            );
                            failures += 1;
                        }
                    }
                }
            }
        }

        failures
    }
}

/// TTL pushed for an entry and whether the clamp applied
///
/// Entries without a remaining lifetime get twice the update interval, so
/// they outlive the next periodic sync.
fn pushed_ttl(remaining: Duration, update_interval: Duration, max_ttl: Option<Duration>) -> (Duration, bool) {
    let ttl = if remaining.is_zero() { update_interval * 2 } else { remaining };
    match max_ttl {
        Some(max) if ttl > max => (max, true),
        _ => (ttl, false),
    }
}
