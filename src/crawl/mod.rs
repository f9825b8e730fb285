// src/crawl/mod.rs
// =============================================================================
// This module crawls the overlay network.
//
// Submodules:
// - engine: the crawl itself (DHT pings, fan-out, nodeinfo requests)
// - retry: bounded retries with randomized exponential backoff
// - tracker: counts outstanding work so we know when the crawl is done
// - bootstrap: waits for the local DHT table before starting
// =============================================================================

mod bootstrap;
mod engine;
mod retry;
mod tracker;

pub use bootstrap::wait_for_bootstrap;
pub use engine::Crawler;
pub use retry::{RetryPolicy, DEFAULT_ATTEMPTS};
