//! Command sentences sent to the device

use std::time::Duration;

use banlist_core::duration::format_duration;
use banlist_core::protocol::{Direction, FirewallMode, Protocol};

/// `/login` with plain-text credentials (RouterOS 6.43 and later).
pub fn login(user: &str, password: &str) -> Vec<String> {
    vec![
        "/login".to_string(),
        format!("=name={}", user),
        format!("=password={}", password),
    ]
}

/// `/{ip|ipv6}/firewall/address-list/add`
pub fn address_list_add(
    proto: Protocol,
    list: &str,
    address: &str,
    ttl: Duration,
    comment: &str,
) -> Vec<String> {
    vec![
        format!("/{}/firewall/address-list/add", proto.as_str()),
        format!("=list={}", list),
        format!("=address={}", address),
        format!("=comment={}", comment),
        format!("=timeout={}", device_timeout(ttl)),
    ]
}

/// `/{ip|ipv6}/firewall/{filter|raw}/set`
pub fn set_rule_address_list(
    proto: Protocol,
    mode: FirewallMode,
    rule_ids: &str,
    direction: Direction,
    list: &str,
) -> Vec<String> {
    vec![
        format!("/{}/firewall/{}/set", proto.as_str(), mode.as_str()),
        format!("={}={}", direction.list_property(), list),
        format!("=.id={}", rule_ids),
    ]
}

/// Address-list timeouts have whole-second resolution and must be positive.
fn device_timeout(ttl: Duration) -> String {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    format_duration(Duration::from_secs(secs.max(1)))
}
