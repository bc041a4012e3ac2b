// # CrowdSec Decision Feed
//
// This crate provides a `DecisionFeed` backed by the CrowdSec Local API
// (LAPI) decision stream, the same endpoint CrowdSec bouncers use.
//
// ## Behavior
//
// - Polls `GET {url}/v1/decisions/stream?startup=<bool>[&origins=a,b]`
//   with the bouncer key in the `X-Api-Key` header
// - The first successful poll uses `startup=true` and returns every active
//   decision; later polls return only what changed
// - `new` decisions become additions, `deleted` decisions become removals
// - Polls without changes are not emitted
// - Failed polls are logged and retried at the next tick
//
// ## Trust Level: Untrusted (Decision Feed)
//
// The feed owns one background polling task that exits when the stream
// receiver is dropped. It never touches the cache or the device.

pub mod api;
mod feed;

pub use feed::{CrowdsecConfig, CrowdsecFeed, DEFAULT_TICKER_INTERVAL, DEFAULT_URL};
