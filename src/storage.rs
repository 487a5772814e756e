//! Content-addressed payload storage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Fetch raw bytes by content identifier.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn fetch(&self, content_id: &str) -> Result<Vec<u8>>;
}

/// IPFS HTTP gateway (`{gateway}/ipfs/{cid}`).
#[derive(Debug, Clone)]
pub struct IpfsGateway {
    base_url: String,
    client: reqwest::Client,
}

impl IpfsGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn url_for(&self, content_id: &str) -> String {
        let cid = content_id.trim().trim_start_matches("ipfs://");
        format!("{}/ipfs/{}", self.base_url, cid)
    }
}

#[async_trait]
impl ContentStore for IpfsGateway {
    async fn fetch(&self, content_id: &str) -> Result<Vec<u8>> {
        let url = self.url_for(content_id);
        debug!(%url, "Fetching payload");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach storage gateway for {}", content_id))?;

        if !response.status().is_success() {
            anyhow::bail!("Gateway returned status {} for {}", response.status(), content_id);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read payload body")?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store keyed by content id.
    #[derive(Debug, Default)]
    pub struct MemoryStore {
        blobs: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStore {
        pub fn insert(&self, content_id: &str, bytes: Vec<u8>) {
            self.blobs.lock().unwrap().insert(content_id.to_string(), bytes);
        }
    }

    #[async_trait]
    impl ContentStore for MemoryStore {
        async fn fetch(&self, content_id: &str) -> Result<Vec<u8>> {
            self.blobs
                .lock()
                .unwrap()
                .get(content_id)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("Gateway returned status 404 Not Found for {}", content_id))
        }
    }
}
