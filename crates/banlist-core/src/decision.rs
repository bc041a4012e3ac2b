//! Threat-intelligence decisions as received from the feed

use serde::{Deserialize, Serialize};

/// A single ban verdict for one address
///
/// Whether it bans or unbans is determined by the list of the
/// [`DecisionBatch`] it arrives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// IPv4 or IPv6 address as sent by the feed
    pub address: String,

    /// Device-style duration (`"4h"`, `"3h59m58.5s"`); empty means no expiry
    #[serde(default)]
    pub duration: String,

    /// Where the decision came from (`crowdsec`, `cscli`, `CAPI`, ...)
    #[serde(default)]
    pub origin: String,

    /// Scenario that triggered the decision (`crowdsecurity/ssh-bf`)
    #[serde(default)]
    pub scenario: String,

    /// Decision scope (`Ip`, `Range`)
    #[serde(default)]
    pub scope: String,
}

impl Decision {
    /// Create a decision for an address with a duration
    pub fn new(address: impl Into<String>, duration: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            duration: duration.into(),
            origin: String::new(),
            scenario: String::new(),
            scope: String::new(),
        }
    }

    /// Set origin, scenario and scope
    pub fn with_source(
        mut self,
        origin: impl Into<String>,
        scenario: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        self.origin = origin.into();
        self.scenario = scenario.into();
        self.scope = scope.into();
        self
    }

    /// Free-text annotation stored with the cache entry and pushed as the
    /// address-list comment
    pub fn annotation(&self) -> String {
        format!("{} {} {}", self.origin, self.scenario, self.scope)
    }
}

/// One delta of decisions delivered by the feed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionBatch {
    /// Addresses to ban
    #[serde(default)]
    pub added: Vec<Decision>,

    /// Addresses to unban
    #[serde(default)]
    pub removed: Vec<Decision>,
}

impl DecisionBatch {
    /// Create a batch
    pub fn new(added: Vec<Decision>, removed: Vec<Decision>) -> Self {
        Self { added, removed }
    }

    /// True when the batch carries no decisions at all
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Total number of decisions in the batch
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation() {
        let decision = Decision::new("1.2.3.4", "4h").with_source("crowdsec", "ssh-bf", "ip");
        assert_eq!(decision.annotation(), "crowdsec ssh-bf ip");
    }

    #[test]
    fn test_batch_len() {
        let batch = DecisionBatch::new(
            vec![Decision::new("1.2.3.4", "1h")],
            vec![Decision::new("5.6.7.8", ""), Decision::new("::1", "")],
        );
        assert_eq!(batch.len(), 3);
        assert!(!batch.is_empty());
        assert!(DecisionBatch::default().is_empty());
    }
}
