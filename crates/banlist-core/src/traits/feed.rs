// # Decision Feed Trait
//
// Source of ban/unban decision batches.
//
// ## Implementations
//
// - CrowdSec LAPI stream: `banlist-crowdsec` crate
//
// ## Usage
//
// ```rust,ignore
// use banlist_core::DecisionFeed;
// use tokio_stream::StreamExt;
//
// let mut stream = feed.watch();
// while let Some(batch) = stream.next().await {
//     println!("{} added, {} removed", batch.added.len(), batch.removed.len());
// }
// ```

use std::pin::Pin;

use tokio_stream::Stream;

use crate::decision::DecisionBatch;

/// Trait for decision feed implementations
///
/// # Trust Level: Semi-Trusted
///
/// ## Allowed Capabilities
/// - ✅ Network I/O to the threat-intelligence service
/// - ✅ Spawn one task driving the stream
///
/// ## Forbidden Capabilities
/// - ❌ Touch the cache or the device (owned by `Reconciler`)
/// - ❌ Emit empty batches
///
/// The stream ends only when the feed can no longer produce batches; the
/// engine treats that as fatal.
pub trait DecisionFeed: Send + Sync {
    /// Stream of decision batches
    ///
    /// Dropping the stream stops the feed.
    fn watch(&self) -> Pin<Box<dyn Stream<Item = DecisionBatch> + Send + 'static>>;

    /// Short name for logs
    fn feed_name(&self) -> &'static str {
        "feed"
    }
}
