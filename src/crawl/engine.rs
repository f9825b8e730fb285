// src/crawl/engine.rs
// =============================================================================
// The crawler: a concurrent, self-expanding search over the overlay.
//
// How it works:
// 1. Start with our own key and coordinates
// 2. DHT ping the node (with retries)
// 3. The first time a node answers, ask it for nodeinfo and start a new
//    crawl task for every node it told us about
// 4. Wait until both phases (pings, nodeinfo) have no work left
// 5. Summarize everything we saw into a Snapshot
//
// Unlike a breadth-first queue, every discovered node gets its own tokio
// task right away. Duplicate rumors are cheap: the visited map turns them
// into no-ops.
//
// Two maps, each behind its own RwLock:
// - topology: every node we tried, and whether it answered
// - nodeinfo: the documents we got back, keyed by node
// =============================================================================

use super::retry::{self, RetryPolicy};
use super::tracker::Completion;
use crate::overlay::{Coords, Identity, NodeId, Overlay};
use crate::report::{Attempt, Snapshot};
use anyhow::{Context, Result};
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

/// Runs one crawl over an overlay collaborator
pub struct Crawler {
    overlay: Arc<dyn Overlay>,
    retry: RetryPolicy,
    topology: RwLock<HashMap<Identity, Attempt>>,
    nodeinfo: RwLock<HashMap<Identity, Value>>,
    completion: Completion,
}

impl Crawler {
    pub fn new(overlay: Arc<dyn Overlay>, retry: RetryPolicy) -> Arc<Self> {
        Arc::new(Self {
            overlay,
            retry,
            topology: RwLock::new(HashMap::new()),
            nodeinfo: RwLock::new(HashMap::new()),
            completion: Completion::new(),
        })
    }

    /// Crawls the whole reachable network and returns the final snapshot.
    ///
    /// Fails only if the local node can't describe itself; every per-node
    /// failure is recorded in the snapshot instead.
    pub async fn run(self: &Arc<Self>) -> Result<Snapshot> {
        let started = Instant::now();

        let key = self
            .overlay
            .local_identity()
            .await
            .context("Failed to get the local public key")?;
        let coords = self
            .overlay
            .local_coords()
            .await
            .context("Failed to get the local coordinates")?;

        info!(key = %key, coords = %coords, "starting crawl");

        self.spawn_explore(key, coords);
        self.completion.drain().await;

        // No writers remain, but take both locks so the snapshot is read
        // under the same discipline as every other access
        let topology = self.topology.write().await;
        let nodeinfo = self.nodeinfo.write().await;
        Ok(Snapshot::build(&topology, &nodeinfo, started.elapsed()))
    }

    // Counts the task as outstanding before it exists
    fn spawn_explore(self: &Arc<Self>, key: Identity, coords: Coords) {
        let guard = self.completion.discovery.begin();
        let crawler = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            crawler.explore(key, coords).await;
        });
    }

    fn spawn_fetch_metadata(self: &Arc<Self>, key: Identity, coords: Coords) {
        let guard = self.completion.metadata.begin();
        let crawler = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            crawler.fetch_metadata(key, coords).await;
        });
    }

    async fn is_found(&self, key: &Identity) -> bool {
        self.topology
            .read()
            .await
            .get(key)
            .map_or(false, |attempt| attempt.found)
    }

    // Boxed because it spawns more of itself
    fn explore(self: Arc<Self>, key: Identity, coords: Coords) -> BoxFuture<'static, ()> {
        async move {
            if self.is_found(&key).await {
                trace!(key = %key, "already found, skipping");
                return;
            }

            let target = NodeId::zero();
            let outcome = retry::with_backoff(&self.retry, "dht ping", || {
                self.overlay.dht_ping(&key, &coords, &target)
            })
            .await;
            let found = outcome.is_ok();

            // Success is sticky: once a node has answered, its record is
            // never rewritten, not even by a later success
            let first_success = {
                let mut topology = self.topology.write().await;
                let previously_found = topology.get(&key).map_or(false, |a| a.found);
                if !previously_found {
                    topology.insert(key, Attempt::new(&key, coords.clone(), found));
                }
                found && !previously_found
            };

            let response = match outcome {
                Ok(response) if first_success => response,
                Ok(_) => {
                    trace!(key = %key, "answered again after being found");
                    return;
                }
                Err(err) => {
                    debug!(key = %key, coords = %coords, error = %err, "node not found");
                    return;
                }
            };

            info!(
                key = %key,
                coords = %coords,
                reported = %response.coords,
                rumors = response.infos.len(),
                "found node"
            );

            self.spawn_fetch_metadata(key, coords);

            for rumor in response.infos {
                self.spawn_explore(rumor.key, rumor.coords);
            }
        }
        .boxed()
    }

    async fn fetch_metadata(self: Arc<Self>, key: Identity, coords: Coords) {
        if self.nodeinfo.read().await.contains_key(&key) {
            return;
        }

        let bytes = match retry::with_backoff(&self.retry, "nodeinfo", || {
            self.overlay.node_info(&key, &coords)
        })
        .await
        {
            Ok(bytes) => bytes,
            Err(err) => {
                // Absence from the nodeinfo map is the failure record
                debug!(key = %key, error = %err, "no nodeinfo");
                return;
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(value) => {
                self.nodeinfo.write().await.insert(key, value);
            }
            Err(err) => {
                warn!(key = %key, error = %err, "discarding malformed nodeinfo");
            }
        }
    }
}
