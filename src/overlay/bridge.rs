// src/overlay/bridge.rs
// =============================================================================
// An Overlay implementation that talks JSON over HTTP to a local bridge
// daemon. The daemon owns the real overlay connection (peering, encryption,
// DHT maintenance) and exposes a handful of endpoints:
//
//   GET  /self       -> { "key": "<hex>", "coords": [..] }
//   GET  /dht        -> { "entries": <n> }
//   POST /dht/ping   -> { "coords": [..], "infos": [{ "key", "coords" }] }
//   POST /nodeinfo   -> raw nodeinfo bytes, passed through untouched
//
// We reuse a single reqwest Client for every request (connection pooling).
// =============================================================================

use super::{Coords, DhtResponse, Identity, NodeId, Overlay, OverlayError};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// HTTP client for a local overlay bridge daemon
#[derive(Debug, Clone)]
pub struct HttpBridge {
    client: Client,
    base: Url,
}

#[derive(Debug, Deserialize)]
struct SelfInfo {
    key: Identity,
    coords: Coords,
}

#[derive(Debug, Deserialize)]
struct TableInfo {
    entries: usize,
}

#[derive(Debug, Serialize)]
struct PingRequest<'a> {
    key: &'a Identity,
    coords: &'a Coords,
    target: &'a NodeId,
}

#[derive(Debug, Serialize)]
struct NodeInfoRequest<'a> {
    key: &'a Identity,
    coords: &'a Coords,
}

impl HttpBridge {
    /// Creates a bridge client for `base_url`.
    ///
    /// `call_timeout` bounds each HTTP request at the transport level. Without
    /// it a request to a bridge that never answers can stall its crawl task.
    pub fn new(base_url: &str, call_timeout: Option<Duration>) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .map_err(|e| anyhow!("Invalid bridge URL '{}': {}", base_url, e))?;

        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(anyhow!("Bridge URL must be http or https: {}", base_url));
        }

        // Url::join replaces the last path segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut builder = Client::builder();
        if let Some(timeout) = call_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, OverlayError> {
        self.base
            .join(path)
            .map_err(|e| OverlayError::Transport(format!("bad endpoint '{}': {}", path, e)))
    }
}

// Turns non-2xx answers into OverlayError::Status
async fn check_status(response: Response) -> Result<Response, OverlayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(OverlayError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl Overlay for HttpBridge {
    async fn local_identity(&self) -> Result<Identity, OverlayError> {
        let response = self.client.get(self.endpoint("self")?).send().await?;
        let info: SelfInfo = check_status(response).await?.json().await?;
        Ok(info.key)
    }

    async fn local_coords(&self) -> Result<Coords, OverlayError> {
        let response = self.client.get(self.endpoint("self")?).send().await?;
        let info: SelfInfo = check_status(response).await?.json().await?;
        Ok(info.coords)
    }

    async fn table_size(&self) -> Result<usize, OverlayError> {
        let response = self.client.get(self.endpoint("dht")?).send().await?;
        let table: TableInfo = check_status(response).await?.json().await?;
        Ok(table.entries)
    }

    async fn dht_ping(
        &self,
        key: &Identity,
        coords: &Coords,
        target: &NodeId,
    ) -> Result<DhtResponse, OverlayError> {
        let body = PingRequest { key, coords, target };
        let response = self
            .client
            .post(self.endpoint("dht/ping")?)
            .json(&body)
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn node_info(&self, key: &Identity, coords: &Coords) -> Result<Vec<u8>, OverlayError> {
        let body = NodeInfoRequest { key, coords };
        let response = self
            .client
            .post(self.endpoint("nodeinfo")?)
            .json(&body)
            .send()
            .await?;
        let bytes = check_status(response).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
