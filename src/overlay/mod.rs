// src/overlay/mod.rs
// =============================================================================
// This module is the boundary between the crawler and the overlay network.
//
// The crawler never opens overlay connections itself. Instead it talks to
// something that implements the `Overlay` trait:
// - bridge: an HTTP client for a local daemon that owns the real connection
// - replay: an in-memory network loaded from a topology file
//
// Tests plug their own mock collaborators into the same trait.
// =============================================================================

mod bridge;
mod identity;
mod replay;

pub use bridge::HttpBridge;
pub use identity::{Coords, Identity, NodeId, ParseIdentityError};
pub use replay::{ReplayNode, ReplayOverlay, Topology};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A candidate node named in a DHT ping response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rumor {
    pub key: Identity,
    pub coords: Coords,
}

/// What a node sends back when it answers a DHT ping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtResponse {
    /// The coordinates the node reported for itself
    pub coords: Coords,
    /// Other nodes this node knows about
    #[serde(default)]
    pub infos: Vec<Rumor>,
}

/// Failures reported by an overlay collaborator
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The request never got an answer (connection refused, reset, etc.)
    #[error("transport error: {0}")]
    Transport(String),

    /// The bridge answered, but not with success
    #[error("bridge returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The answer could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The node did not answer the probe
    #[error("node {0} did not respond")]
    Unreachable(Identity),

    /// The node is not part of the (replayed) network at all
    #[error("node {0} is not known to the network")]
    UnknownNode(Identity),
}

impl From<reqwest::Error> for OverlayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            OverlayError::Decode(err.to_string())
        } else {
            OverlayError::Transport(err.to_string())
        }
    }
}

/// The operations the crawler needs from an already-connected overlay node.
///
/// Implementations must be safe to call from many tasks at once: the crawler
/// fans out one task per discovered node and shares a single collaborator.
#[async_trait]
pub trait Overlay: Send + Sync {
    /// Public key of the local node (the crawl starts here)
    async fn local_identity(&self) -> Result<Identity, OverlayError>;

    /// Current coordinates of the local node
    async fn local_coords(&self) -> Result<Coords, OverlayError>;

    /// Number of entries in the local DHT table (used to wait for bootstrap)
    async fn table_size(&self) -> Result<usize, OverlayError>;

    /// Sends one DHT ping to `key` at `coords`, asking about `target`
    async fn dht_ping(
        &self,
        key: &Identity,
        coords: &Coords,
        target: &NodeId,
    ) -> Result<DhtResponse, OverlayError>;

    /// Asks `key` for its self-reported nodeinfo document (raw bytes)
    async fn node_info(&self, key: &Identity, coords: &Coords) -> Result<Vec<u8>, OverlayError>;
}
