//! Cached permission snapshots
//!
//! `OPTIONS` answers are cached per path and only re-fetched after an
//! explicit invalidation: per path when the caller knows something changed
//! there, wholesale when the user logs in or out.

use crate::error::Result;
use agora_client::{Capabilities, ResourceClient};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Per-path capability cache in front of [`ResourceClient::options`]
pub struct PermissionCache {
    client: Arc<dyn ResourceClient>,
    entries: DashMap<String, Capabilities>,
}

impl PermissionCache {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self {
            client,
            entries: DashMap::new(),
        }
    }

    /// Capabilities at `path`, fetched on first use
    pub async fn capabilities(&self, path: &str) -> Result<Capabilities> {
        if let Some(cached) = self.entries.get(path) {
            return Ok(cached.clone());
        }

        debug!(path, "fetching options");
        let capabilities = self.client.options(path).await?;
        self.entries.insert(path.to_string(), capabilities.clone());
        Ok(capabilities)
    }

    /// Whether the current user may create resources below `path`
    pub async fn can_post(&self, path: &str) -> Result<bool> {
        Ok(self.capabilities(path).await?.post)
    }

    /// Whether `path` accepts `header` on writes
    pub async fn supports_header(&self, path: &str, header: &str) -> Result<bool> {
        Ok(self.capabilities(path).await?.supports_header(header))
    }

    /// Snapshot without a network call
    pub fn cached(&self, path: &str) -> Option<Capabilities> {
        self.entries.get(path).map(|entry| entry.clone())
    }

    pub fn invalidate(&self, path: &str) {
        self.entries.remove(path);
    }

    /// Drop every snapshot, e.g. after the user changed
    pub fn invalidate_all(&self) {
        debug!(entries = self.entries.len(), "invalidating permissions");
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_client::MemoryResourceClient;

    #[tokio::test]
    async fn test_cached_until_invalidated() {
        let memory = Arc::new(
            MemoryResourceClient::new().with_capabilities("/rates/", Capabilities::read_only()),
        );
        let cache = PermissionCache::new(memory.clone());

        assert!(!cache.can_post("/rates/").await.unwrap());
        assert!(!cache.can_post("/rates/").await.unwrap());
        assert_eq!(memory.calls().options, 1);

        memory.set_capabilities("/rates/", Capabilities::all()).await;
        assert!(!cache.can_post("/rates/").await.unwrap());

        cache.invalidate("/rates/");
        assert!(cache.can_post("/rates/").await.unwrap());
        assert_eq!(memory.calls().options, 2);
    }

    #[tokio::test]
    async fn test_invalidate_all() {
        let memory = Arc::new(MemoryResourceClient::new());
        let cache = PermissionCache::new(memory.clone());

        cache.capabilities("/a/").await.unwrap();
        cache.capabilities("/b/").await.unwrap();
        assert!(cache.cached("/a/").is_some());

        cache.invalidate_all();
        assert!(cache.cached("/a/").is_none());
        assert!(cache.cached("/b/").is_none());
    }
}
