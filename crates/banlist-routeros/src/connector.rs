//! Device connector and session for the RouterOS API

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use banlist_core::config::DeviceConfig;
use banlist_core::protocol::{Direction, FirewallMode, Protocol};
use banlist_core::traits::{DeviceConnector, DeviceSession};
use banlist_core::{Error, Result};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, error};

use crate::client::{Client, Transport};
use crate::command;

/// Plain API port
pub const API_PORT: u16 = 8728;

/// API-SSL port
pub const API_SSL_PORT: u16 = 8729;

/// `host:port` to dial, adding the service port when the host has none.
pub fn socket_address(host: &str, tls: bool) -> String {
    let port = if tls { API_SSL_PORT } else { API_PORT };

    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{}]:{}", ip, port),
        Ok(IpAddr::V4(ip)) => format!("{}:{}", ip, port),
        Err(_) if host.contains(':') => host.to_string(),
        Err(_) => format!("{}:{}", host, port),
    }
}

/// Host part used for certificate verification.
pub fn server_name(host: &str) -> String {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return addr.ip().to_string();
    }
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }
    match host.rsplit_once(':') {
        Some((name, _port)) => name.to_string(),
        None => host.to_string(),
    }
}

fn tls_connector() -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::config(format!("TLS configuration error: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Opens authenticated RouterOS API sessions
///
/// # Trust Level: Untrusted
///
/// One TCP (or TLS) connection per session. No pooling, no retries; a failed
/// connect aborts the current sync run only.
///
/// # Security
///
/// The Debug implementation does NOT expose the password.
pub struct RouterOsConnector {
    config: DeviceConfig,
    address: String,
    tls: Option<TlsConnector>,
}

impl std::fmt::Debug for RouterOsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterOsConnector")
            .field("address", &self.address)
            .field("user", &self.config.user)
            .field("password", &"<REDACTED>")
            .field("tls", &self.tls.is_some())
            .field("timeout", &self.config.timeout)
            .finish()
    }
}

impl RouterOsConnector {
    /// Create a connector for the configured device
    ///
    /// # Errors
    ///
    /// `Error::Config` when the device configuration is incomplete or the TLS
    /// client cannot be built.
    pub fn new(config: DeviceConfig) -> Result<Self> {
        config.validate()?;

        let address = socket_address(&config.host, config.tls);
        let tls = if config.tls { Some(tls_connector()?) } else { None };

        Ok(Self { config, address, tls })
    }

    /// Address dialed for each session
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn open(&self) -> Result<Client> {
        let host = self.config.host.as_str();

        let tcp = TcpStream::connect(&self.address)
            .await
            .map_err(|e| Error::connect(host, e.to_string()))?;

        let stream: Box<dyn Transport> = match &self.tls {
            Some(connector) => {
                let name = ServerName::try_from(server_name(host))
                    .map_err(|e| Error::connect(host, format!("invalid TLS server name: {}", e)))?;
                let tls = connector
                    .connect(name, tcp)
                    .await
                    .map_err(|e| Error::connect(host, format!("TLS handshake failed: {}", e)))?;
                Box::new(tls)
            }
            None => Box::new(tcp),
        };

        let mut client = Client::new(stream, self.config.timeout);
        match client.login(&self.config.user, &self.config.password).await {
            Ok(()) => Ok(client),
            Err(e @ Error::Timeout(_)) => Err(e),
            Err(e) => Err(Error::connect(host, format!("login failed: {}", e))),
        }
    }
}

#[async_trait]
impl DeviceConnector for RouterOsConnector {
    async fn connect(&self) -> Result<Box<dyn DeviceSession>> {
        debug!(
            address = %self.address,
            user = %self.config.user,
            tls = self.config.tls,
            timeout = ?self.config.timeout,
            "Opening API session"
        );

        match tokio::time::timeout(self.config.timeout, self.open()).await {
            Ok(Ok(client)) => Ok(Box::new(RouterOsSession::new(client))),
            Ok(Err(e)) => Err(e),
            Err(_) => {
                error!(address = %self.address, timeout = ?self.config.timeout, "Connect timed out");
                Err(Error::Timeout(self.config.timeout))
            }
        }
    }

    fn host(&self) -> &str {
        &self.config.host
    }
}

/// One authenticated API session
pub struct RouterOsSession {
    client: Option<Client>,
}

impl RouterOsSession {
    fn new(client: Client) -> Self {
        Self { client: Some(client) }
    }

    fn client(&mut self) -> Result<&mut Client> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::device("session already closed"))
    }
}

#[async_trait]
impl DeviceSession for RouterOsSession {
    async fn add_address_to_list(
        &mut self,
        proto: Protocol,
        list: &str,
        address: &str,
        ttl: Duration,
        comment: &str,
    ) -> Result<()> {
        let words = command::address_list_add(proto, list, address, ttl, comment);
        debug!(command = %words.join(" "), "Sending command");
        let response = self.client()?.run(words).await?;
        debug!(response = ?response.done, "Command done");
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
        let words = command::set_rule_address_list(proto, mode, rule_ids, direction, list);
        debug!(command = %words.join(" "), "Sending command");
        self.client()?.run(words).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        match self.client.take() {
            Some(client) => client.close().await,
            None => Ok(()),
        }
    }
}
