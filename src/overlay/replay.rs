// src/overlay/replay.rs
// =============================================================================
// An in-memory overlay network loaded from a topology file.
//
// This lets us run a full crawl without a live overlay connection: every DHT
// ping and nodeinfo request is answered from the file. It's used by the
// `replay` subcommand and by the crawler tests.
//
// Topology file format:
//
//   {
//     "local": "<hex key of the node we crawl from>",
//     "nodes": {
//       "<hex key>": {
//         "coords": [1, 3],
//         "peers": ["<hex key>", ...],
//         "nodeinfo": { "name": "..." },      (optional)
//         "raw_nodeinfo": "not json",         (optional, sent verbatim)
//         "reachable": true,                  (optional, default true)
//         "flaky": 2                          (optional, fail the first N pings)
//       }
//     }
//   }
// =============================================================================

use super::{Coords, DhtResponse, Identity, NodeId, Overlay, OverlayError, Rumor};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

fn default_reachable() -> bool {
    true
}

/// One node in a replayed network
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayNode {
    pub coords: Coords,
    #[serde(default)]
    pub peers: Vec<Identity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodeinfo: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_nodeinfo: Option<String>,
    #[serde(default = "default_reachable")]
    pub reachable: bool,
    #[serde(default)]
    pub flaky: u32,
}

impl ReplayNode {
    pub fn new(coords: Vec<u64>) -> Self {
        Self {
            coords: Coords::new(coords),
            reachable: true,
            ..Default::default()
        }
    }

    pub fn with_peers(mut self, peers: &[Identity]) -> Self {
        self.peers = peers.to_vec();
        self
    }

    pub fn with_nodeinfo(mut self, nodeinfo: Value) -> Self {
        self.nodeinfo = Some(nodeinfo);
        self
    }

    pub fn with_raw_nodeinfo(mut self, raw: &str) -> Self {
        self.raw_nodeinfo = Some(raw.to_string());
        self
    }

    pub fn unreachable(mut self) -> Self {
        self.reachable = false;
        self
    }

    pub fn flaky(mut self, failures: u32) -> Self {
        self.flaky = failures;
        self
    }
}

/// A whole replayed network: the local node plus everything it can reach
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    pub local: Identity,
    pub nodes: HashMap<Identity, ReplayNode>,
}

impl Topology {
    pub fn new(local: Identity, node: ReplayNode) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(local, node);
        Self { local, nodes }
    }

    pub fn with_node(mut self, key: Identity, node: ReplayNode) -> Self {
        self.nodes.insert(key, node);
        self
    }
}

/// Overlay collaborator backed by a `Topology`.
///
/// Counts every ping and nodeinfo request per node so callers (and tests)
/// can see exactly how much work the crawl did.
#[derive(Debug)]
pub struct ReplayOverlay {
    topology: Topology,
    pings: Mutex<HashMap<Identity, usize>>,
    infos: Mutex<HashMap<Identity, usize>>,
}

impl ReplayOverlay {
    pub fn new(topology: Topology) -> Result<Self> {
        if !topology.nodes.contains_key(&topology.local) {
            return Err(anyhow!(
                "Topology does not describe its local node {}",
                topology.local
            ));
        }
        Ok(Self {
            topology,
            pings: Mutex::new(HashMap::new()),
            infos: Mutex::new(HashMap::new()),
        })
    }

    /// Loads a topology file from disk
    pub async fn from_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read topology file {}", path.display()))?;
        let topology: Topology = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid topology file {}", path.display()))?;
        Self::new(topology)
    }

    pub fn ping_count(&self, key: &Identity) -> usize {
        self.pings.lock().get(key).copied().unwrap_or(0)
    }

    pub fn nodeinfo_count(&self, key: &Identity) -> usize {
        self.infos.lock().get(key).copied().unwrap_or(0)
    }

    pub fn total_pings(&self) -> usize {
        self.pings.lock().values().sum()
    }

    fn local(&self) -> &ReplayNode {
        // Presence checked in new()
        &self.topology.nodes[&self.topology.local]
    }

    // Bumps the counter and returns how many calls came before this one
    fn record(counter: &Mutex<HashMap<Identity, usize>>, key: &Identity) -> usize {
        let mut calls = counter.lock();
        let count = calls.entry(*key).or_insert(0);
        let previous = *count;
        *count += 1;
        previous
    }
}

#[async_trait]
impl Overlay for ReplayOverlay {
    async fn local_identity(&self) -> Result<Identity, OverlayError> {
        Ok(self.topology.local)
    }

    async fn local_coords(&self) -> Result<Coords, OverlayError> {
        Ok(self.local().coords.clone())
    }

    async fn table_size(&self) -> Result<usize, OverlayError> {
        Ok(self.local().peers.len())
    }

    async fn dht_ping(
        &self,
        key: &Identity,
        _coords: &Coords,
        _target: &NodeId,
    ) -> Result<DhtResponse, OverlayError> {
        let previous = Self::record(&self.pings, key);

        let node = self
            .topology
            .nodes
            .get(key)
            .ok_or(OverlayError::UnknownNode(*key))?;

        if !node.reachable || previous < node.flaky as usize {
            return Err(OverlayError::Unreachable(*key));
        }

        // Peers missing from the file are still rumored, they just never answer
        let infos = node
            .peers
            .iter()
            .map(|peer| Rumor {
                key: *peer,
                coords: self
                    .topology
                    .nodes
                    .get(peer)
                    .map(|n| n.coords.clone())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(DhtResponse {
            coords: node.coords.clone(),
            infos,
        })
    }

    async fn node_info(&self, key: &Identity, _coords: &Coords) -> Result<Vec<u8>, OverlayError> {
        Self::record(&self.infos, key);

        let node = self
            .topology
            .nodes
            .get(key)
            .ok_or(OverlayError::UnknownNode(*key))?;

        if !node.reachable {
            return Err(OverlayError::Unreachable(*key));
        }

        if let Some(raw) = &node.raw_nodeinfo {
            return Ok(raw.as_bytes().to_vec());
        }

        match &node.nodeinfo {
            Some(value) => {
                serde_json::to_vec(value).map_err(|e| OverlayError::Decode(e.to_string()))
            }
            None => Err(OverlayError::Unreachable(*key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(byte: u8) -> Identity {
        Identity::from_bytes([byte; 32])
    }

    #[tokio::test]
    async fn test_ping_returns_peers_with_coords() {
        let topology = Topology::new(key(1), ReplayNode::new(vec![]).with_peers(&[key(2)]))
            .with_node(key(2), ReplayNode::new(vec![4]));
        let overlay = ReplayOverlay::new(topology).unwrap();

        let response = overlay
            .dht_ping(&key(1), &Coords::default(), &NodeId::zero())
            .await
            .unwrap();
        assert_eq!(response.infos.len(), 1);
        assert_eq!(response.infos[0].key, key(2));
        assert_eq!(response.infos[0].coords, Coords::new(vec![4]));
        assert_eq!(overlay.ping_count(&key(1)), 1);
    }

    #[tokio::test]
    async fn test_flaky_node_recovers() {
        let topology = Topology::new(key(1), ReplayNode::new(vec![]).flaky(2));
        let overlay = ReplayOverlay::new(topology).unwrap();
        let (local, coords, target) = (key(1), Coords::default(), NodeId::zero());
        let ping = || overlay.dht_ping(&local, &coords, &target);

        assert!(ping().await.is_err());
        assert!(ping().await.is_err());
        assert!(ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_node_fails() {
        let overlay = ReplayOverlay::new(Topology::new(key(1), ReplayNode::new(vec![]))).unwrap();
        let result = overlay
            .dht_ping(&key(9), &Coords::default(), &NodeId::zero())
            .await;
        assert!(matches!(result, Err(OverlayError::UnknownNode(_))));
    }

    #[tokio::test]
    async fn test_nodeinfo_raw_wins() {
        let node = ReplayNode::new(vec![])
            .with_nodeinfo(json!({"name": "a"}))
            .with_raw_nodeinfo("{broken");
        let overlay = ReplayOverlay::new(Topology::new(key(1), node)).unwrap();
        let bytes = overlay.node_info(&key(1), &Coords::default()).await.unwrap();
        assert_eq!(bytes, b"{broken");
        assert_eq!(overlay.nodeinfo_count(&key(1)), 1);
    }

    #[test]
    fn test_missing_local_node_rejected() {
        let topology = Topology {
            local: key(1),
            nodes: HashMap::new(),
        };
        assert!(ReplayOverlay::new(topology).is_err());
    }

    #[test]
    fn test_parse_topology_file_defaults() {
        let raw = format!(
            r#"{{"local":"{a}","nodes":{{"{a}":{{"coords":[]}}}}}}"#,
            a = key(7)
        );
        let topology: Topology = serde_json::from_str(&raw).unwrap();
        let node = &topology.nodes[&key(7)];
        assert!(node.reachable);
        assert_eq!(node.flaky, 0);
        assert!(node.peers.is_empty());
    }
}
