//! Protocol family, firewall mode and rule direction
//!
//! These three closed sets select which device menu a command targets.
//! Every combination is handled exhaustively by `match`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address family of a banned address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// IPv4 (`/ip` menu)
    Ipv4,
    /// IPv6 (`/ipv6` menu)
    Ipv6,
}

impl Protocol {
    /// All protocol families, IPv4 first
    pub const ALL: [Protocol; 2] = [Protocol::Ipv4, Protocol::Ipv6];

    /// Classify an address string
    ///
    /// Detection is structural: anything containing a colon is IPv6.
    pub fn of(address: &str) -> Self {
        if address.contains(':') {
            Protocol::Ipv6
        } else {
            Protocol::Ipv4
        }
    }

    /// Device menu prefix and metrics label (`ip` / `ipv6`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ipv4 => "ip",
            Protocol::Ipv6 => "ipv6",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Firewall table whose rules reference the address list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirewallMode {
    /// `/ip/firewall/filter`
    Filter,
    /// `/ip/firewall/raw`
    Raw,
}

impl FirewallMode {
    /// All modes, filter first
    pub const ALL: [FirewallMode; 2] = [FirewallMode::Filter, FirewallMode::Raw];

    /// Device menu name
    pub fn as_str(&self) -> &'static str {
        match self {
            FirewallMode::Filter => "filter",
            FirewallMode::Raw => "raw",
        }
    }
}

impl fmt::Display for FirewallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of a rule matches the address list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Source address
    Src,
    /// Destination address
    Dst,
}

impl Direction {
    /// Both directions, source first
    pub const ALL: [Direction; 2] = [Direction::Src, Direction::Dst];

    /// Short label (`src` / `dst`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Src => "src",
            Direction::Dst => "dst",
        }
    }

    /// Rule property holding the list name
    pub fn list_property(&self) -> &'static str {
        match self {
            Direction::Src => "src-address-list",
            Direction::Dst => "dst-address-list",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical cache key for an address
///
/// IPv6 host addresses are stored as `/128` prefixes, the form the device
/// reports and expects. Addresses that already carry a prefix are kept.
pub fn canonical_address(address: &str) -> String {
    match Protocol::of(address) {
        Protocol::Ipv6 if !address.contains('/') => format!("{}/128", address),
        _ => address.to_string(),
    }
}
