//! Error types for the banlist system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for banlist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the banlist system
#[derive(Error, Debug)]
pub enum Error {
    /// A duration string could not be parsed
    #[error("Invalid duration format: {0}")]
    InvalidDuration(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connecting to the firewall device failed
    #[error("Device connection failed ({host}): {message}")]
    Connect {
        /// Device host
        host: String,
        /// Error message
        message: String,
    },

    /// A command sent to the firewall device failed
    #[error("Device error: {0}")]
    Device(String),

    /// A device connect or command exceeded its timeout
    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Decision feed errors
    #[error("Decision feed error: {0}")]
    Feed(String),

    /// The decision feed stream ended
    #[error("Decision feed closed")]
    FeedClosed,

    /// Metrics registration or encoding errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid duration error
    pub fn invalid_duration(input: impl Into<String>) -> Self {
        Self::InvalidDuration(input.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a device connection error
    pub fn connect(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a device command error
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a decision feed error
    pub fn feed(msg: impl Into<String>) -> Self {
        Self::Feed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_connect_error_names_host() {
        let err = Error::connect("192.168.88.1:8729", "connection refused");
        assert_eq!(
            err.to_string(),
            "Device connection failed (192.168.88.1:8729): connection refused"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "Timed out after 10s");
    }
}
