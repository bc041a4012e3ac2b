//! Configuration types for the reconciler
//!
//! The daemon builds a [`ReconcilerConfig`] from environment variables; library
//! users and tests construct one directly. Durations are plain
//! [`std::time::Duration`] values.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::{Direction, FirewallMode, Protocol};

/// Firewall rule ids: digits separated by commas.
static RULE_IDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]+,?)+$").expect("invalid rule id pattern"));

/// Keep the first three characters of a secret for logging.
pub fn redact_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(3).collect();
    format!("{}...", prefix)
}

/// Main reconciler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Firewall device connection
    pub device: DeviceConfig,

    /// Prefix of the snapshot address lists created on the device
    #[serde(default = "default_address_list")]
    pub address_list: String,

    /// Process IPv4 decisions
    #[serde(default = "default_enabled")]
    pub ipv4: bool,

    /// Process IPv6 decisions
    #[serde(default = "default_enabled")]
    pub ipv6: bool,

    /// Repoint firewall filter rules
    #[serde(default = "default_enabled")]
    pub firewall_filter: bool,

    /// Repoint firewall raw rules
    #[serde(default = "default_enabled")]
    pub firewall_raw: bool,

    /// Rule ids per protocol, mode and direction
    #[serde(default)]
    pub rules: Vec<RuleBinding>,

    /// TTL used when a decision duration cannot be parsed
    #[serde(default = "default_ttl")]
    pub default_ttl: Duration,

    /// Upper bound for TTLs pushed to the device
    #[serde(default = "default_max_ttl")]
    pub max_ttl: Duration,

    /// Apply `max_ttl`
    #[serde(default)]
    pub use_max_ttl: bool,

    /// Period of the full device resync
    #[serde(default = "default_update_interval")]
    pub update_interval: Duration,

    /// Resync right after a batch that changed the cache
    #[serde(default = "default_enabled")]
    pub trigger_on_update: bool,

    /// Per-kind cap on decisions applied from one batch (debugging aid)
    #[serde(default)]
    pub debug_decisions_max: Option<usize>,
}

impl ReconcilerConfig {
    /// Create a configuration with defaults for the given device
    pub fn new(device: DeviceConfig) -> Self {
        Self {
            device,
            address_list: default_address_list(),
            ipv4: true,
            ipv6: true,
            firewall_filter: true,
            firewall_raw: true,
            rules: Vec::new(),
            default_ttl: default_ttl(),
            max_ttl: default_max_ttl(),
            use_max_ttl: false,
            update_interval: default_update_interval(),
            trigger_on_update: true,
            debug_decisions_max: None,
        }
    }

    /// Set the rule ids for one protocol, mode and direction
    pub fn with_rules(
        mut self,
        proto: Protocol,
        mode: FirewallMode,
        direction: Direction,
        ids: impl Into<String>,
    ) -> Self {
        let ids = ids.into();
        match self
            .rules
            .iter_mut()
            .find(|b| b.proto == proto && b.mode == mode && b.direction == direction)
        {
            Some(binding) => binding.ids = ids,
            None => self.rules.push(RuleBinding {
                proto,
                mode,
                direction,
                ids,
            }),
        }
        self
    }

    /// Rule ids configured for one protocol, mode and direction
    pub fn rule_ids(&self, proto: Protocol, mode: FirewallMode, direction: Direction) -> Option<&str> {
        self.rules
            .iter()
            .find(|b| b.proto == proto && b.mode == mode && b.direction == direction)
            .map(|b| b.ids.as_str())
            .filter(|ids| !ids.is_empty())
    }

    /// Whether decisions of this family are processed
    pub fn protocol_enabled(&self, proto: Protocol) -> bool {
        match proto {
            Protocol::Ipv4 => self.ipv4,
            Protocol::Ipv6 => self.ipv6,
        }
    }

    /// Whether rules of this table are repointed
    pub fn mode_enabled(&self, mode: FirewallMode) -> bool {
        match mode {
            FirewallMode::Filter => self.firewall_filter,
            FirewallMode::Raw => self.firewall_raw,
        }
    }

    /// Validate the configuration
    ///
    /// Every enabled protocol and mode needs rule ids for both directions.
    pub fn validate(&self) -> Result<()> {
        self.device.validate()?;

        if self.address_list.is_empty() {
            return Err(Error::config("Address list prefix cannot be empty"));
        }
        if self.update_interval.is_zero() {
            return Err(Error::config("Update interval must be > 0"));
        }
        if self.max_ttl < self.update_interval {
            return Err(Error::config(format!(
                "Max TTL ({:?}) cannot be shorter than the update interval ({:?})",
                self.max_ttl, self.update_interval
            )));
        }
        if self.debug_decisions_max == Some(0) {
            return Err(Error::config("Debug decision cap must be > 0 when set"));
        }

        for proto in Protocol::ALL.into_iter().filter(|p| self.protocol_enabled(*p)) {
            for mode in FirewallMode::ALL.into_iter().filter(|m| self.mode_enabled(*m)) {
                for direction in Direction::ALL {
                    let ids = self.rule_ids(proto, mode, direction).ok_or_else(|| {
                        Error::config(format!(
                            "No {} {} rule ids configured for {}",
                            proto, mode, direction
                        ))
                    })?;
                    if !RULE_IDS.is_match(ids) {
                        return Err(Error::config(format!(
                            "{} {} {} rule ids can contain only numbers and commas: {}",
                            proto, mode, direction, ids
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Rule ids whose address-list property is repointed on every sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleBinding {
    /// Protocol family
    pub proto: Protocol,
    /// Firewall table
    pub mode: FirewallMode,
    /// Rule side
    pub direction: Direction,
    /// Comma-separated rule ids (`"3,7"`)
    pub ids: String,
}

/// Firewall device connection settings
#[derive(Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Host, optionally with port (`192.168.88.1`, `router:8729`)
    pub host: String,

    /// API user
    pub user: String,

    /// API password
    pub password: String,

    /// Use the TLS API endpoint
    #[serde(default = "default_enabled")]
    pub tls: bool,

    /// Timeout for connecting and for each command
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

impl DeviceConfig {
    /// Create a device configuration with TLS and the default timeout
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            tls: true,
            timeout: default_timeout(),
        }
    }

    /// Enable or disable TLS
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the device configuration
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::config("Device host cannot be empty"));
        }
        if self.user.is_empty() {
            return Err(Error::config("Device user cannot be empty"));
        }
        if self.password.is_empty() {
            return Err(Error::config("Device password cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(Error::config("Device timeout must be > 0"));
        }
        Ok(())
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &redact_secret(&self.password))
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn default_address_list() -> String {
    "crowdsec".to_string()
}

fn default_enabled() -> bool {
    true
}

fn default_ttl() -> Duration {
    Duration::from_secs(3 * 3600)
}

fn default_max_ttl() -> Duration {
    Duration::from_secs(4 * 3600)
}

fn default_update_interval() -> Duration {
    Duration::from_secs(3600)
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}
