// src/crawl/bootstrap.rs
// =============================================================================
// Waits for the local node's DHT table to fill up before crawling.
//
// A freshly connected node only knows its direct peers. Crawling from there
// works, but the first DHT ping answers are much richer once the table has a
// few entries, so we poll until it has at least `min_entries`.
// =============================================================================

use crate::overlay::Overlay;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::info;

/// Polls `overlay.table_size()` every `interval` until it reaches `min_entries`
pub async fn wait_for_bootstrap(
    overlay: &dyn Overlay,
    min_entries: usize,
    interval: Duration,
) -> Result<usize> {
    info!(min_entries, "waiting for DHT bootstrap");

    loop {
        let entries = overlay
            .table_size()
            .await
            .context("Failed to read the DHT table size")?;

        if entries >= min_entries {
            info!(entries, "DHT bootstrap complete");
            return Ok(entries);
        }

        tokio::time::sleep(interval).await;
    }
}
