// src/report.rs
// =============================================================================
// Turns the crawler's maps into the final results document.
//
// The document has three parts:
// - meta: when it was generated, how long the crawl took, and the counts
// - topology: every node we tried, keyed by public key
// - nodeinfo: every nodeinfo document we received, keyed by public key
//
// It is built exactly once, after the crawl has fully finished, and written
// to disk in one go (temp file + rename), so nobody ever reads half a file.
// =============================================================================

use crate::overlay::{Coords, Identity, NodeId};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv6Addr;
use std::path::Path;
use std::time::Duration;

/// What we know about one node we tried to reach
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attempt {
    pub node_id: NodeId,
    pub ipv6_addr: Ipv6Addr,
    pub ipv6_subnet: String,
    /// Coordinates the DHT ping was sent to
    pub coords: Coords,
    /// Did the node answer?
    pub found: bool,
}

impl Attempt {
    pub fn new(key: &Identity, coords: Coords, found: bool) -> Self {
        let node_id = key.node_id();
        Self {
            node_id,
            ipv6_addr: node_id.address(),
            ipv6_subnet: node_id.subnet(),
            coords,
            found,
        }
    }
}

/// Summary counts for a finished crawl
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Meta {
    pub generated_at_utc: i64,
    pub crawl_time_seconds: f64,
    pub nodes_attempted: usize,
    pub nodes_successful: usize,
    pub nodes_failed: usize,
    pub nodeinfo_successful: usize,
    /// Found nodes that gave us no (usable) nodeinfo
    pub nodeinfo_failed: usize,
}

/// The complete results of one crawl
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub meta: Meta,
    pub topology: BTreeMap<Identity, Attempt>,
    pub nodeinfo: BTreeMap<Identity, Value>,
}

impl Snapshot {
    /// Computes the counts and copies both maps into a snapshot
    pub fn build(
        topology: &HashMap<Identity, Attempt>,
        nodeinfo: &HashMap<Identity, Value>,
        elapsed: Duration,
    ) -> Self {
        let attempted = topology.len();
        let successful = topology.values().filter(|a| a.found).count();
        let nodeinfo_successful = nodeinfo.len();

        let meta = Meta {
            generated_at_utc: Utc::now().timestamp(),
            crawl_time_seconds: elapsed.as_secs_f64(),
            nodes_attempted: attempted,
            nodes_successful: successful,
            nodes_failed: attempted - successful,
            nodeinfo_successful,
            // Relative to found nodes: only those were ever asked
            nodeinfo_failed: successful.saturating_sub(nodeinfo_successful),
        };

        Self {
            meta,
            topology: topology.iter().map(|(k, v)| (*k, v.clone())).collect(),
            nodeinfo: nodeinfo.iter().map(|(k, v)| (*k, v.clone())).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize results")
    }

    /// Writes the snapshot to `path` in a single step
    pub async fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = Path::new(&tmp);

        tokio::fs::write(tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(tmp, path)
            .await
            .with_context(|| format!("Failed to move results into {}", path.display()))?;
        Ok(())
    }

    /// Prints the human-readable summary
    pub fn print_summary(&self) {
        let meta = &self.meta;
        println!();
        println!("⏱️  The crawl took {:.2}s", meta.crawl_time_seconds);
        println!();
        println!("📊 Summary:");
        println!("   📋 Processed: {}", meta.nodes_attempted);
        println!("   ✅ Found: {}", meta.nodes_successful);
        println!("   ❌ Not found: {}", meta.nodes_failed);
        println!();
        println!("   📄 Responded with nodeinfo: {}", meta.nodeinfo_successful);
        println!("   ⚠️  No nodeinfo: {}", meta.nodeinfo_failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(byte: u8) -> Identity {
        Identity::from_bytes([byte; 32])
    }

    fn sample() -> Snapshot {
        let mut topology = HashMap::new();
        topology.insert(key(1), Attempt::new(&key(1), Coords::default(), true));
        topology.insert(key(2), Attempt::new(&key(2), Coords::new(vec![1]), true));
        topology.insert(key(3), Attempt::new(&key(3), Coords::new(vec![2]), true));
        topology.insert(key(4), Attempt::new(&key(4), Coords::new(vec![3]), false));
        topology.insert(key(5), Attempt::new(&key(5), Coords::new(vec![4]), false));

        let mut nodeinfo = HashMap::new();
        nodeinfo.insert(key(1), json!({"name": "one"}));

        Snapshot::build(&topology, &nodeinfo, Duration::from_millis(1500))
    }

    #[test]
    fn test_counts_are_consistent() {
        let meta = sample().meta;
        assert_eq!(meta.nodes_attempted, 5);
        assert_eq!(meta.nodes_successful, 3);
        assert_eq!(meta.nodes_failed, 2);
        assert_eq!(meta.nodeinfo_successful, 1);
        assert_eq!(meta.nodeinfo_failed, 2);
        assert_eq!(meta.crawl_time_seconds, 1.5);
    }

    #[test]
    fn test_empty_crawl() {
        let snapshot = Snapshot::build(&HashMap::new(), &HashMap::new(), Duration::ZERO);
        assert_eq!(snapshot.meta.nodes_attempted, 0);
        assert_eq!(snapshot.meta.nodeinfo_failed, 0);
    }

    #[test]
    fn test_json_layout() {
        let json: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();

        assert_eq!(json["meta"]["nodes_attempted"], 5);
        assert_eq!(json["meta"]["nodeinfo_failed"], 2);
        assert!(json["meta"]["generated_at_utc"].is_i64());

        let entry = &json["topology"][key(2).to_hex()];
        assert_eq!(entry["coords"], json!([1]));
        assert_eq!(entry["found"], true);
        assert_eq!(entry["node_id"], key(2).node_id().to_string());
        assert!(entry["ipv6_addr"].as_str().unwrap().starts_with("2"));
        assert!(entry["ipv6_subnet"].as_str().unwrap().ends_with("/64"));

        assert_eq!(json["nodeinfo"][key(1).to_hex()]["name"], "one");
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        sample().write(&path).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"topology\""));
        assert!(!dir.path().join("results.json.tmp").exists());
    }
}
