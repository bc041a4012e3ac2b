//! Polling decision feed

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use banlist_core::config::redact_secret;
use banlist_core::{DecisionBatch, DecisionFeed, Error, Result};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use crate::api::{StreamResponse, stream_query, stream_url};

/// Default LAPI base URL
pub const DEFAULT_URL: &str = "http://crowdsec:8080/";

/// Default polling interval
pub const DEFAULT_TICKER_INTERVAL: Duration = Duration::from_secs(10);

/// HTTP timeout for a single poll
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// LAPI connection settings
#[derive(Clone)]
pub struct CrowdsecConfig {
    /// LAPI base URL
    pub url: String,
    /// Bouncer API key, sent as `X-Api-Key`
    pub api_key: String,
    /// Only receive decisions from these origins (all when empty)
    pub origins: Vec<String>,
    /// Time between polls
    pub ticker_interval: Duration,
}

impl CrowdsecConfig {
    /// Settings with the default URL and interval
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            api_key: api_key.into(),
            origins: Vec::new(),
            ticker_interval: DEFAULT_TICKER_INTERVAL,
        }
    }

    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(Error::config("CrowdSec URL cannot be empty"));
        }
        if self.api_key.is_empty() {
            return Err(Error::config("CrowdSec bouncer API key cannot be empty"));
        }
        if self.ticker_interval.is_zero() {
            return Err(Error::config("Ticker interval must be > 0"));
        }
        Ok(())
    }
}

impl fmt::Debug for CrowdsecConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrowdsecConfig")
            .field("url", &self.url)
            .field("api_key", &redact_secret(&self.api_key))
            .field("origins", &self.origins)
            .field("ticker_interval", &self.ticker_interval)
            .finish()
    }
}

/// CrowdSec LAPI stream bouncer
///
/// # Trust Level: Untrusted (Decision Feed)
///
/// Polls `GET /v1/decisions/stream` on a fixed interval. The first successful
/// poll asks for the full decision set (`startup=true`); later polls receive
/// deltas. A failed poll is logged and repeated at the next tick with the
/// same `startup` flag, so the full set is never skipped.
pub struct CrowdsecFeed {
    config: CrowdsecConfig,
    client: reqwest::Client,
}

impl CrowdsecFeed {
    /// Create a feed
    ///
    /// # Errors
    ///
    /// `Error::Config` for invalid settings or when the HTTP client cannot be
    /// built.
    pub fn new(config: CrowdsecConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("banlist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

/// One poll of the stream endpoint.
async fn poll_once(
    client: &reqwest::Client,
    config: &CrowdsecConfig,
    startup: bool,
) -> Result<DecisionBatch> {
    let response = client
        .get(stream_url(&config.url))
        .header("X-Api-Key", &config.api_key)
        .query(&stream_query(startup, &config.origins))
        .send()
        .await
        .map_err(|e| Error::feed(format!("HTTP request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(match status.as_u16() {
            401 | 403 => Error::feed(format!("API key rejected. Status: {}", status)),
            500..=599 => Error::feed(format!("LAPI server error (transient): {}", status)),
            _ => Error::feed(format!("Unexpected status: {}", status)),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::feed(format!("Failed to read response: {}", e)))?;
    let parsed: StreamResponse = serde_json::from_str(&body)?;
    Ok(parsed.into_batch())
}

impl DecisionFeed for CrowdsecFeed {
    fn watch(&self) -> Pin<Box<dyn Stream<Item = DecisionBatch> + Send + 'static>> {
        let (tx, rx) = mpsc::unbounded_channel();

        let config = self.config.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            info!(
                url = %config.url,
                origins = ?config.origins,
                interval = ?config.ticker_interval,
                "Starting decision stream"
            );

            let mut startup = true;

            loop {
                if tx.is_closed() {
                    debug!("Receiver dropped, stopping decision stream");
                    break;
                }

                match poll_once(&client, &config, startup).await {
                    Ok(batch) => {
                        startup = false;
                        if batch.is_empty() {
                            debug!("No decision changes");
                        } else {
                            info!(
                                added = batch.added.len(),
                                removed = batch.removed.len(),
                                "Received decisions"
                            );
                            if tx.send(batch).is_err() {
                                debug!("Receiver dropped, stopping decision stream");
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, startup, "Decision stream poll failed");
                    }
                }

                tokio::time::sleep(config.ticker_interval).await;
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn feed_name(&self) -> &'static str {
        "crowdsec"
    }
}
