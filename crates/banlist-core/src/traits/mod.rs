//! Core traits for the reconciler
//!
//! - [`DecisionFeed`]: source of decision batches
//! - [`DeviceConnector`] / [`DeviceSession`]: firewall device access

pub mod feed;
pub mod device;

pub use feed::DecisionFeed;
pub use device::{DeviceConnector, DeviceSession};
