// # banlistd - CrowdSec to MikroTik Daemon
//
// This daemon is a THIN integration layer:
// - Reads configuration from environment variables
// - Sets up logging and the `/metrics` endpoint
// - Wires the CrowdSec feed and the RouterOS connector into the Reconciler
// - Translates SIGTERM/SIGINT into a clean shutdown
//
// All merge and sync logic lives in banlist-core.
//
// ## Configuration
//
// ### MikroTik device
// - `MIKROTIK_HOST`: Device address, optionally with port (required)
// - `MIKROTIK_USER` / `MIKROTIK_PASS`: API credentials (required)
// - `MIKROTIK_TLS`: Use API-SSL on 8729 instead of 8728 (default: true)
// - `MIKROTIK_TIMEOUT`: Connect and command timeout (default: 10s)
//
// ### Address lists and rules
// - `MIKROTIK_ADDRESS_LIST`: Snapshot list prefix (default: crowdsec)
// - `MIKROTIK_IPV4` / `MIKROTIK_IPV6`: Process each family (default: true)
// - `MIKROTIK_FIREWALL_FILTER_ENABLE` / `MIKROTIK_FIREWALL_RAW_ENABLE`:
//   Repoint filter / raw rules (default: true)
// - `{IP,IPV6}_FIREWALL_{FILTER,RAW}_RULES_{SRC,DST}`: Comma-separated rule
//   ids, required for every enabled family and table
// - `MIKROTIK_UPDATE_FREQUENCY`: Periodic sync interval (default: 1h)
// - `TRIGGER_ON_UPDATE`: Sync right after decisions change (default: true)
//
// ### TTLs
// - `DEFAULT_TTL`: TTL for decisions with an unparseable duration (default: 3h)
// - `USE_MAX_TTL` / `DEFAULT_TTL_MAX`: Clamp pushed TTLs (default: false / 4h)
//
// ### CrowdSec
// - `CROWDSEC_URL`: LAPI base URL (default: http://crowdsec:8080/)
// - `CROWDSEC_BOUNCER_API_KEY`: Bouncer key (required)
// - `CROWDSEC_ORIGINS`: Only these origins (default: all)
// - `TICKER_INTERVAL`: LAPI poll interval (default: 10s)
//
// ### Operations
// - `METRICS_ADDRESS`: Prometheus listen address (default: :2112)
// - `LOG_LEVEL`: trace, debug, info, warn, error or -1..3 (default: info)
// - `LOG_FORMAT_JSON`: JSON log lines instead of text (default: true)
// - `DEBUG_DECISIONS_MAX`: Cap decisions applied per batch (default: -1, off)
//
// ## Example
//
// ```bash
// export MIKROTIK_HOST=192.168.88.1
// export MIKROTIK_USER=crowdsec
// export MIKROTIK_PASS=secret
// export IP_FIREWALL_FILTER_RULES_SRC=1
// export IP_FIREWALL_FILTER_RULES_DST=2
// export MIKROTIK_IPV6=false
// export MIKROTIK_FIREWALL_RAW_ENABLE=false
// export CROWDSEC_BOUNCER_API_KEY=...
//
// banlistd
// ```

mod config;

use std::process::ExitCode;

use anyhow::Result;
use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use banlist_core::{Error as CoreError, Reconciler, ReconcilerMetrics};
use banlist_crowdsec::CrowdsecFeed;
use banlist_routeros::RouterOsConnector;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::Config;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BanlistExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<BanlistExitCode> for ExitCode {
    fn from(code: BanlistExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return BanlistExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return BanlistExitCode::ConfigError.into();
    }

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return BanlistExitCode::ConfigError.into();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        revision = option_env!("BANLIST_GIT_COMMIT").unwrap_or("unknown"),
        build_date = option_env!("BANLIST_BUILD_DATE").unwrap_or("unknown"),
        "Build info"
    );
    for (key, value) in config.redacted() {
        info!(key, value = %value, "Using config");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return BanlistExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config)).into()
}

fn init_tracing(config: &Config) -> Result<()> {
    // RUST_LOG, when set, refines LOG_LEVEL per target.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));
    let builder = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_env_filter(filter);

    if config.log_format_json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Run the daemon until shutdown or a fatal error
async fn run_daemon(config: Config) -> BanlistExitCode {
    let metrics = match ReconcilerMetrics::new() {
        Ok(metrics) => metrics,
        Err(e) => {
            error!("Failed to register metrics: {}", e);
            return BanlistExitCode::ConfigError;
        }
    };

    let listener = match TcpListener::bind(&config.metrics_address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(metrics_address = %config.metrics_address, "Failed to start metrics server: {}", e);
            return BanlistExitCode::ConfigError;
        }
    };
    let metrics_app = metrics_router(metrics.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, metrics_app.into_make_service()).await {
            error!("Metrics server error: {}", e);
        }
    });
    info!(metrics_address = %config.metrics_address, "Metrics server started");

    let engine = match build_engine(config, metrics) {
        Ok(engine) => engine,
        Err(e) => {
            error!("Failed to initialize: {}", e);
            return BanlistExitCode::ConfigError;
        }
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => info!("Received shutdown signal: {}", signal),
            Err(e) => error!("Shutdown signal error: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    match engine.run_with_shutdown(Some(shutdown_rx)).await {
        Ok(()) => {
            info!("Shutting down daemon");
            BanlistExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            BanlistExitCode::RuntimeError
        }
    }
}

fn build_engine(config: Config, metrics: ReconcilerMetrics) -> Result<Reconciler, CoreError> {
    let connector = RouterOsConnector::new(config.reconciler.device.clone())?;
    let feed = CrowdsecFeed::new(config.crowdsec)?;
    Reconciler::new(Box::new(feed), Box::new(connector), config.reconciler, metrics)
}

fn metrics_router(metrics: ReconcilerMetrics) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(metrics)
}

/// GET /metrics: Prometheus text exposition
async fn prometheus_metrics(State(metrics): State<ReconcilerMetrics>) -> Response {
    match metrics.encode_text() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode Prometheus metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Wait for SIGTERM or SIGINT
///
/// # Returns
///
/// The name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for Ctrl-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
