//! Daemon configuration from environment variables

use std::time::Duration;

use anyhow::{Context, Result, bail};
use banlist_core::config::{DeviceConfig, ReconcilerConfig, redact_secret};
use banlist_core::duration::{format_duration, parse_duration};
use banlist_core::protocol::{Direction, FirewallMode, Protocol};
use banlist_crowdsec::{CrowdsecConfig, DEFAULT_TICKER_INTERVAL, DEFAULT_URL};
use tracing::Level;

/// Application configuration
pub struct Config {
    pub reconciler: ReconcilerConfig,
    pub crowdsec: CrowdsecConfig,
    pub metrics_address: String,
    pub log_level: Level,
    pub log_format_json: bool,
}

/// Environment variable holding the rule ids for one binding,
/// e.g. `IPV6_FIREWALL_RAW_RULES_DST`.
pub fn rules_variable(proto: Protocol, mode: FirewallMode, direction: Direction) -> String {
    format!(
        "{}_FIREWALL_{}_RULES_{}",
        proto.as_str().to_uppercase(),
        mode.as_str().to_uppercase(),
        direction.as_str().to_uppercase()
    )
}

/// Boolean in any of the spellings `true/false`, `1/0`, `t/f`.
fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "t" | "true" | "yes" | "on" => Ok(true),
        "0" | "f" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be a boolean, got '{}'", key, other),
    }
}

fn parse_std_duration(key: &str, value: &str) -> Result<Duration> {
    let delta = parse_duration(value.trim()).with_context(|| format!("Failed to parse {}", key))?;
    delta
        .to_std()
        .map_err(|_| anyhow::anyhow!("{} cannot be negative, got '{}'", key, value))
}

/// Log level by name, or by number where -1 is trace and 3 is error.
pub fn parse_log_level(value: &str) -> Result<Level> {
    let level = match value.trim().to_lowercase().as_str() {
        "trace" | "-1" => Level::TRACE,
        "debug" | "0" => Level::DEBUG,
        "info" | "1" | "" => Level::INFO,
        "warn" | "2" => Level::WARN,
        "error" | "fatal" | "panic" | "3" | "4" | "5" => Level::ERROR,
        other => bail!(
            "LOG_LEVEL '{}' is not valid. Valid levels: trace, debug, info, warn, error or -1..3",
            other
        ),
    };
    Ok(level)
}

/// Listen address for the metrics endpoint; a bare `:port` binds all
/// interfaces.
pub fn normalize_listen_address(value: &str) -> String {
    match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{}", port),
        None => value.to_string(),
    }
}

/// Origins separated by commas or whitespace.
fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => bail!("{} is required. Set it via: export {}=...", key, key),
            }
        };
        let flag = |key: &str, default: bool| -> Result<bool> {
            lookup(key).map_or(Ok(default), |value| parse_bool(key, &value))
        };
        let duration = |key: &str, default: &str| -> Result<Duration> {
            parse_std_duration(key, &text(key, default))
        };

        let device = DeviceConfig::new(
            required("MIKROTIK_HOST")?,
            required("MIKROTIK_USER")?,
            required("MIKROTIK_PASS")?,
        )
        .with_tls(flag("MIKROTIK_TLS", true)?)
        .with_timeout(duration("MIKROTIK_TIMEOUT", "10s")?);

        let mut reconciler = ReconcilerConfig::new(device);
        reconciler.address_list = text("MIKROTIK_ADDRESS_LIST", "crowdsec");
        reconciler.ipv4 = flag("MIKROTIK_IPV4", true)?;
        reconciler.ipv6 = flag("MIKROTIK_IPV6", true)?;
        reconciler.firewall_filter = flag("MIKROTIK_FIREWALL_FILTER_ENABLE", true)?;
        reconciler.firewall_raw = flag("MIKROTIK_FIREWALL_RAW_ENABLE", true)?;
        reconciler.update_interval = duration("MIKROTIK_UPDATE_FREQUENCY", "1h")?;
        reconciler.default_ttl = duration("DEFAULT_TTL", "3h")?;
        reconciler.use_max_ttl = flag("USE_MAX_TTL", false)?;
        reconciler.max_ttl = duration("DEFAULT_TTL_MAX", "4h")?;
        reconciler.trigger_on_update = flag("TRIGGER_ON_UPDATE", true)?;

        let debug_max: i64 = text("DEBUG_DECISIONS_MAX", "-1")
            .trim()
            .parse()
            .context("DEBUG_DECISIONS_MAX must be an integer")?;
        reconciler.debug_decisions_max = usize::try_from(debug_max).ok().filter(|n| *n > 0);

        // Only enabled combinations are read; the rest may stay unset.
        for proto in Protocol::ALL {
            for mode in FirewallMode::ALL {
                if !reconciler.protocol_enabled(proto) || !reconciler.mode_enabled(mode) {
                    continue;
                }
                for direction in Direction::ALL {
                    let ids = required(&rules_variable(proto, mode, direction))?;
                    reconciler = reconciler.with_rules(proto, mode, direction, ids);
                }
            }
        }

        let crowdsec = CrowdsecConfig {
            url: text("CROWDSEC_URL", DEFAULT_URL),
            api_key: required("CROWDSEC_BOUNCER_API_KEY")?,
            origins: parse_origins(&text("CROWDSEC_ORIGINS", "")),
            ticker_interval: duration("TICKER_INTERVAL", &format_duration(DEFAULT_TICKER_INTERVAL))?,
        };

        Ok(Self {
            reconciler,
            crowdsec,
            metrics_address: normalize_listen_address(&text("METRICS_ADDRESS", ":2112")),
            log_level: parse_log_level(&text("LOG_LEVEL", "info"))?,
            log_format_json: flag("LOG_FORMAT_JSON", true)?,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.reconciler.validate()?;
        self.crowdsec.validate()?;
        if self.metrics_address.is_empty() {
            bail!("METRICS_ADDRESS cannot be empty");
        }
        Ok(())
    }

    /// Settings as `(name, value)` pairs with secrets redacted
    pub fn redacted(&self) -> Vec<(&'static str, String)> {
        let r = &self.reconciler;
        let mut out = vec![
            ("mikrotik_host", r.device.host.clone()),
            ("mikrotik_user", r.device.user.clone()),
            ("mikrotik_pass", redact_secret(&r.device.password)),
            ("mikrotik_tls", r.device.tls.to_string()),
            ("mikrotik_timeout", format_duration(r.device.timeout)),
            ("mikrotik_address_list", r.address_list.clone()),
            ("mikrotik_ipv4", r.ipv4.to_string()),
            ("mikrotik_ipv6", r.ipv6.to_string()),
            ("mikrotik_firewall_filter_enable", r.firewall_filter.to_string()),
            ("mikrotik_firewall_raw_enable", r.firewall_raw.to_string()),
            ("mikrotik_update_frequency", format_duration(r.update_interval)),
            ("default_ttl", format_duration(r.default_ttl)),
            ("use_max_ttl", r.use_max_ttl.to_string()),
            ("default_ttl_max", format_duration(r.max_ttl)),
            ("trigger_on_update", r.trigger_on_update.to_string()),
            (
                "debug_decisions_max",
                r.debug_decisions_max.map_or("-1".to_string(), |n| n.to_string()),
            ),
            ("crowdsec_url", self.crowdsec.url.clone()),
            ("crowdsec_bouncer_api_key", redact_secret(&self.crowdsec.api_key)),
            ("crowdsec_origins", self.crowdsec.origins.join(",")),
            ("ticker_interval", format_duration(self.crowdsec.ticker_interval)),
            ("metrics_address", self.metrics_address.clone()),
            ("log_level", self.log_level.to_string()),
            ("log_format_json", self.log_format_json.to_string()),
        ];
        for binding in &r.rules {
            let key = match (binding.proto, binding.mode, binding.direction) {
                (Protocol::Ipv4, FirewallMode::Filter, Direction::Src) => "ip_firewall_filter_rules_src",
                (Protocol::Ipv4, FirewallMode::Filter, Direction::Dst) => "ip_firewall_filter_rules_dst",
                (Protocol::Ipv4, FirewallMode::Raw, Direction::Src) => "ip_firewall_raw_rules_src",
                (Protocol::Ipv4, FirewallMode::Raw, Direction::Dst) => "ip_firewall_raw_rules_dst",
                (Protocol::Ipv6, FirewallMode::Filter, Direction::Src) => "ipv6_firewall_filter_rules_src",
                (Protocol::Ipv6, FirewallMode::Filter, Direction::Dst) => "ipv6_firewall_filter_rules_dst",
                (Protocol::Ipv6, FirewallMode::Raw, Direction::Src) => "ipv6_firewall_raw_rules_src",
                (Protocol::Ipv6, FirewallMode::Raw, Direction::Dst) => "ipv6_firewall_raw_rules_dst",
            };
            out.push((key, binding.ids.clone()));
        }
        out
    }
}
