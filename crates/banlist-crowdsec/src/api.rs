//! LAPI decision stream wire types

use banlist_core::{Decision, DecisionBatch};
use serde::Deserialize;
use tracing::warn;

/// Path of the decision stream endpoint, relative to the LAPI base URL.
pub const STREAM_PATH: &str = "v1/decisions/stream";

/// Body of `GET /v1/decisions/stream`
///
/// LAPI sends `null` instead of an empty array when nothing changed.
#[derive(Debug, Default, Deserialize)]
pub struct StreamResponse {
    #[serde(default)]
    pub new: Option<Vec<LapiDecision>>,
    #[serde(default)]
    pub deleted: Option<Vec<LapiDecision>>,
}

/// One decision as LAPI reports it. Every field is optional on the wire.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LapiDecision {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl LapiDecision {
    /// Convert to a feed decision; decisions without a value are dropped.
    pub fn into_decision(self) -> Option<Decision> {
        let address = self.value.filter(|v| !v.is_empty());
        let Some(address) = address else {
            warn!(id = ?self.id, scenario = ?self.scenario, "Dropping decision without a value");
            return None;
        };

        Some(
            Decision::new(address, self.duration.unwrap_or_default()).with_source(
                self.origin.unwrap_or_default(),
                self.scenario.unwrap_or_default(),
                self.scope.unwrap_or_default(),
            ),
        )
    }
}

impl StreamResponse {
    /// Convert to a batch of additions and removals.
    pub fn into_batch(self) -> DecisionBatch {
        let convert = |list: Option<Vec<LapiDecision>>| -> Vec<Decision> {
            list.unwrap_or_default()
                .into_iter()
                .filter_map(LapiDecision::into_decision)
                .collect()
        };
        DecisionBatch::new(convert(self.new), convert(self.deleted))
    }
}

/// Full stream endpoint URL; a trailing slash on the base is optional.
pub fn stream_url(base: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), STREAM_PATH)
}

/// Query parameters for one poll.
pub fn stream_query(startup: bool, origins: &[String]) -> Vec<(&'static str, String)> {
    let mut query = vec![("startup", startup.to_string())];
    if !origins.is_empty() {
        query.push(("origins", origins.join(",")));
    }
    query
}
