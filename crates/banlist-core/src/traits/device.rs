// # Firewall Device Traits
//
// A `DeviceConnector` opens one `DeviceSession` per sync run. The session is
// owned by the run and closed before the run's lock is released.
//
// ## Implementations
//
// - RouterOS API: `banlist-routeros` crate
//
// ## Usage
//
// ```rust,ignore
// let mut session = connector.connect().await?;
// session
//     .add_address_to_list(Protocol::Ipv4, "crowdsec_2024-01-01_00-00-00", "1.2.3.4", ttl, "comment")
//     .await?;
// session
//     .set_rule_address_list(Protocol::Ipv4, FirewallMode::Filter, "3,4", Direction::Src, "crowdsec_...")
//     .await?;
// session.close().await?;
// ```

use std::time::Duration;

use async_trait::async_trait;

use crate::protocol::{Direction, FirewallMode, Protocol};

/// Opens device sessions
///
/// # Trust Level: Untrusted
///
/// ## Allowed Capabilities
/// - ✅ Connect to the configured device only
/// - ✅ Apply the configured connect timeout
///
/// ## Forbidden Capabilities
/// - ❌ Retry (the next periodic sync is the retry)
/// - ❌ Hold sessions between runs
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Connect and authenticate
    ///
    /// # Returns
    ///
    /// - `Ok(session)`: an authenticated session
    /// - `Err(Error::Connect | Error::Timeout)`: the run is aborted
    async fn connect(&self) -> Result<Box<dyn DeviceSession>, crate::Error>;

    /// Device host for logs
    fn host(&self) -> &str;
}

/// One authenticated session with the device
///
/// Every command is bounded by the configured timeout; a timeout is reported
/// as an error like any other failure.
#[async_trait]
pub trait DeviceSession: Send {
    /// Add an address to an address list with an expiry
    ///
    /// Corresponds to `/{ip|ipv6}/firewall/address-list/add`.
    async fn add_address_to_list(
        &mut self,
        proto: Protocol,
        list: &str,
        address: &str,
        ttl: Duration,
        comment: &str,
    ) -> Result<(), crate::Error>;

    /// Point the given rules' address-list property at `list`
    ///
    /// Corresponds to `/{ip|ipv6}/firewall/{filter|raw}/set`.
    async fn set_rule_address_list(
        &mut self,
        proto: Protocol,
        mode: FirewallMode,
        rule_ids: &str,
        direction: Direction,
        list: &str,
    ) -> Result<(), crate::Error>;

    /// Close the session
    async fn close(&mut self) -> Result<(), crate::Error>;
}
