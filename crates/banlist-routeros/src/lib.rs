// # RouterOS API Device Connector
//
// This crate implements `DeviceConnector` / `DeviceSession` for MikroTik
// RouterOS devices over the binary API protocol.
//
// ## Implementation Status
//
// - ✅ Plain API (port 8728) and API-SSL (port 8729, rustls with webpki roots)
// - ✅ Word-length codec for all five prefix widths
// - ✅ Plain-text `/login` (RouterOS 6.43 and later)
// - ✅ `!trap` replies surfaced as device errors carrying the device message
// - ✅ Connect and per-command timeouts
// - ❌ NO legacy challenge login (pre-6.43 devices are rejected)
// - ❌ NO retry logic (the next periodic sync is the retry)
// - ❌ NO connection pooling (one session per sync run)
// - ❌ NO reads of device state (the reconciler is push-only)
//
// ## Trust Level: Untrusted (Device Connector)
//
// **Allowed Capabilities**:
// - ✅ Connect to the configured device only
// - ✅ Send the address-list and rule commands requested by the engine
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Keep sessions open after `close()`
// - ❌ Make scheduling decisions (owned by the Reconciler)
//
// ## Security Requirements
//
// - The password NEVER appears in logs or Debug output
// - TLS certificates are verified against the webpki root set
//
// ## Protocol Reference
//
// - Sentences: length-prefixed words terminated by an empty word
// - Replies: `!re` (data), `!done` (end), `!trap` (error), `!fatal` (closing)
// - Add: `/{ip|ipv6}/firewall/address-list/add =list= =address= =comment= =timeout=`
// - Repoint: `/{ip|ipv6}/firewall/{filter|raw}/set =<src|dst>-address-list= =.id=`

pub mod client;
pub mod codec;
pub mod command;
mod connector;

pub use client::{Client, Response};
pub use connector::{API_PORT, API_SSL_PORT, RouterOsConnector, RouterOsSession, server_name, socket_address};
