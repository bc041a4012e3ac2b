//! Test doubles and common utilities for contract tests
//!
//! The doubles record what the engine asks of them; they contain no
//! reconciliation logic of their own.

#![allow(dead_code)]

use banlist_core::config::{DeviceConfig, ReconcilerConfig};
use banlist_core::error::{Error, Result};
use banlist_core::metrics::ReconcilerMetrics;
use banlist_core::protocol::{Direction, FirewallMode, Protocol};
use banlist_core::traits::{DecisionFeed, DeviceConnector, DeviceSession};
use banlist_core::{Decision, DecisionBatch, Reconciler};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// A feed that emits batches on demand
pub struct ControlledFeed {
    /// Receiver for the engine's watch stream
    engine_rx: Mutex<Option<mpsc::UnboundedReceiver<DecisionBatch>>>,
    /// Call counter for watch()
    watch_call_count: Arc<AtomicUsize>,
}

impl ControlledFeed {
    /// Create a feed and the sender the test drives it with
    pub fn new() -> (Self, mpsc::UnboundedSender<DecisionBatch>) {
        let (test_tx, engine_rx) = mpsc::unbounded_channel();
        let feed = Self {
            engine_rx: Mutex::new(Some(engine_rx)),
            watch_call_count: Arc::new(AtomicUsize::new(0)),
        };
        (feed, test_tx)
    }

    /// Get the number of times watch() was called
    pub fn watch_call_count(&self) -> usize {
        self.watch_call_count.load(Ordering::SeqCst)
    }
}

impl DecisionFeed for ControlledFeed {
    fn watch(&self) -> Pin<Box<dyn Stream<Item = DecisionBatch> + Send + 'static>> {
        self.watch_call_count.fetch_add(1, Ordering::SeqCst);

        let rx = self
            .engine_rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");

        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn feed_name(&self) -> &'static str {
        "controlled"
    }
}

/// A feed that never emits and never ends
pub struct IdleFeed;

impl DecisionFeed for IdleFeed {
    fn watch(&self) -> Pin<Box<dyn Stream<Item = DecisionBatch> + Send + 'static>> {
        Box::pin(tokio_stream::pending())
    }
}

/// A feed whose stream ends immediately
pub struct ClosedFeed;

impl DecisionFeed for ClosedFeed {
    fn watch(&self) -> Pin<Box<dyn Stream<Item = DecisionBatch> + Send + 'static>> {
        Box::pin(tokio_stream::empty())
    }
}

/// One command received by the recording device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCall {
    Add {
        proto: Protocol,
        list: String,
        address: String,
        ttl: Duration,
        comment: String,
    },
    SetRule {
        proto: Protocol,
        mode: FirewallMode,
        rule_ids: String,
        direction: Direction,
        list: String,
    },
}

#[derive(Default)]
struct DeviceShared {
    calls: Mutex<Vec<DeviceCall>>,
    connect_count: AtomicUsize,
    close_count: AtomicUsize,
    add_count: AtomicUsize,
    open_sessions: AtomicUsize,
    max_open_sessions: AtomicUsize,
}

/// A device connector that records every command
#[derive(Clone)]
pub struct RecordingDevice {
    shared: Arc<DeviceShared>,
    fail_connect: bool,
    /// Fail the add with this zero-based index (counted across sessions)
    fail_add_at: Option<usize>,
    /// Fail the repoint of this combination
    fail_repoint: Option<(Protocol, FirewallMode, Direction)>,
    /// Delay applied to every add
    add_delay: Duration,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(DeviceShared::default()),
            fail_connect: false,
            fail_add_at: None,
            fail_repoint: None,
            add_delay: Duration::ZERO,
        }
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn failing_add_at(mut self, index: usize) -> Self {
        self.fail_add_at = Some(index);
        self
    }

    pub fn failing_repoint(mut self, proto: Protocol, mode: FirewallMode, direction: Direction) -> Self {
        self.fail_repoint = Some((proto, mode, direction));
        self
    }

    pub fn with_add_delay(mut self, delay: Duration) -> Self {
        self.add_delay = delay;
        self
    }

    /// Create a connector that shares recordings with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        other.clone()
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    pub fn adds(&self) -> Vec<DeviceCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::Add { .. }))
            .collect()
    }

    pub fn rule_sets(&self) -> Vec<DeviceCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, DeviceCall::SetRule { .. }))
            .collect()
    }

    pub fn connect_count(&self) -> usize {
        self.shared.connect_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.shared.close_count.load(Ordering::SeqCst)
    }

    pub fn max_open_sessions(&self) -> usize {
        self.shared.max_open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DeviceConnector for RecordingDevice {
    async fn connect(&self) -> Result<Box<dyn DeviceSession>> {
        self.shared.connect_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(Error::connect("test-device", "connection refused"));
        }

        let open = self.shared.open_sessions.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_open_sessions.fetch_max(open, Ordering::SeqCst);

        Ok(Box::new(RecordingSession {
            device: self.clone(),
            closed: false,
        }))
    }

    fn host(&self) -> &str {
        "test-device"
    }
}

struct RecordingSession {
    device: RecordingDevice,
    closed: bool,
}

#[async_trait::async_trait]
impl DeviceSession for RecordingSession {
    async fn add_address_to_list(
        &mut self,
        proto: Protocol,
        list: &str,
        address: &str,
        ttl: Duration,
        comment: &str,
    ) -> Result<()> {
        if !self.device.add_delay.is_zero() {
            tokio::time::sleep(self.device.add_delay).await;
        }

        let index = self.device.shared.add_count.fetch_add(1, Ordering::SeqCst);
        if self.device.fail_add_at == Some(index) {
            return Err(Error::device("failure: already have such entry"));
        }

        self.device.shared.calls.lock().unwrap().push(DeviceCall::Add {
            proto,
            list: list.to_string(),
            address: address.to_string(),
            ttl,
            comment: comment.to_string(),
        });
        Ok(())
    }

    async fn set_rule_address_list(
        &mut self,
        proto: Protocol,
        mode: FirewallMode,
        rule_ids: &str,
        direction: Direction,
        list: &str,
    ) -> Result<()> {
        if self.device.fail_repoint == Some((proto, mode, direction)) {
            return Err(Error::device("failure: no such item"));
        }

        self.device.shared.calls.lock().unwrap().push(DeviceCall::SetRule {
            proto,
            mode,
            rule_ids: rule_ids.to_string(),
            direction,
            list: list.to_string(),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.device.shared.close_count.fetch_add(1, Ordering::SeqCst);
            self.device.shared.open_sessions.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Configuration with rule ids for every protocol, mode and direction
///
/// Rule ids encode the combination: `1x` ip, `2x` ipv6; `x1`/`x2` filter
/// src/dst, `x3`/`x4` raw src/dst.
pub fn full_config() -> ReconcilerConfig {
    ReconcilerConfig::new(DeviceConfig::new("test-device", "api", "secret"))
        .with_rules(Protocol::Ipv4, FirewallMode::Filter, Direction::Src, "11")
        .with_rules(Protocol::Ipv4, FirewallMode::Filter, Direction::Dst, "12")
        .with_rules(Protocol::Ipv4, FirewallMode::Raw, Direction::Src, "13")
        .with_rules(Protocol::Ipv4, FirewallMode::Raw, Direction::Dst, "14")
        .with_rules(Protocol::Ipv6, FirewallMode::Filter, Direction::Src, "21")
        .with_rules(Protocol::Ipv6, FirewallMode::Filter, Direction::Dst, "22")
        .with_rules(Protocol::Ipv6, FirewallMode::Raw, Direction::Src, "23")
        .with_rules(Protocol::Ipv6, FirewallMode::Raw, Direction::Dst, "24")
}

/// Reconciler with an idle feed and the given device
pub fn reconciler(config: ReconcilerConfig, device: &RecordingDevice) -> Reconciler {
    reconciler_with_feed(Box::new(IdleFeed), config, device)
}

/// Reconciler with the given feed and device
pub fn reconciler_with_feed(
    feed: Box<dyn DecisionFeed>,
    config: ReconcilerConfig,
    device: &RecordingDevice,
) -> Reconciler {
    let metrics = ReconcilerMetrics::new().expect("metrics registration succeeds");
    Reconciler::new(
        feed,
        Box::new(RecordingDevice::sharing_counters_with(device)),
        config,
        metrics,
    )
    .expect("reconciler construction succeeds")
}

/// A ban decision with a typical CrowdSec source
pub fn ban(address: &str, duration: &str) -> Decision {
    Decision::new(address, duration).with_source("crowdsec", "crowdsecurity/ssh-bf", "Ip")
}

/// A batch of ban decisions
pub fn add_batch(decisions: Vec<Decision>) -> DecisionBatch {
    DecisionBatch::new(decisions, Vec::new())
}

/// A batch of unban decisions
pub fn remove_batch(decisions: Vec<Decision>) -> DecisionBatch {
    DecisionBatch::new(Vec::new(), decisions)
}
