//! The Data Gateway: uniform, cached access to named resource collections.
//!
//! Every list/create/update/delete in the dashboard goes through this one
//! surface. Reads are stale-while-revalidate: a cached value is returned
//! immediately when present, and a background refresh runs when the entry is
//! flagged stale. Writes flag **every** cache entry for the resource stale
//! (coarse invalidation — never scoped to the filters that produced a cached
//! list). Consistency is eventual only: there is no optimistic local update,
//! so a page may briefly display pre-mutation data after its own write.
//!
//! The gateway never retries; retry, if any, is a caller decision.
//!
//! # Usage
//!
//! ```rust,ignore
//! use fieldgate_core::gateway::{DataGateway, QueryOptions};
//!
//! let gateway = DataGateway::new(store, &config.cache);
//!
//! let dealers = gateway
//!     .list("dealers", &QueryOptions::new().order_by("created_at", false))
//!     .await?;
//!
//! gateway.create("dealers", record).await?; // flags every "dealers" key stale
//! ```

pub mod cache;
pub mod query;

pub use cache::CacheStats;
pub use query::{OrderBy, QueryOptions, Record};

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::store::ResourceStore;

use cache::ListCache;

/// Generic cached gateway over named resource collections.
#[derive(Clone)]
pub struct DataGateway {
    store: Arc<dyn ResourceStore>,
    cache: Arc<ListCache>,
}

impl DataGateway {
    pub fn new(store: Arc<dyn ResourceStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            cache: Arc::new(ListCache::new(config.max_entries)),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// List records of a resource.
    ///
    /// Cache key = (resource, canonical serialization of the options). A
    /// fresh hit returns immediately. A stale hit returns the cached rows
    /// immediately and spawns at most one background refresh for the key. A
    /// miss fetches synchronously and seeds the cache.
    #[instrument(skip(self, options), fields(resource = resource))]
    pub async fn list(&self, resource: &str, options: &QueryOptions) -> Result<Vec<Record>> {
        let key = options.cache_key(resource);

        if let Some((rows, stale)) = self.cache.lookup(&key) {
            if stale && self.cache.begin_refresh(&key) {
                let gateway = self.clone();
                let resource = resource.to_string();
                let options = options.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    gateway.refresh(&resource, &options, &key).await;
                });
            }
            debug!(key = %key, stale = stale, "List served from cache");
            return Ok(rows.as_ref().clone());
        }

        // Capture the resource generation before the fetch: a write landing
        // while the fetch is in flight bumps it, and store() then keeps the
        // snapshot flagged stale instead of passing it off as fresh.
        let generation = self.cache.generation(resource);
        let rows = self.store.list(resource, options).await?;
        self.cache.store(&key, resource, rows.clone(), generation);
        debug!(key = %key, rows = rows.len(), "List fetched and cached");
        Ok(rows)
    }

    /// Background revalidation of one cache key. Failures are logged and the
    /// stale entry stays in place for the next read to retry.
    async fn refresh(&self, resource: &str, options: &QueryOptions, key: &str) {
        let generation = self.cache.generation(resource);
        match self.store.list(resource, options).await {
            Ok(rows) => {
                debug!(key = %key, rows = rows.len(), "Background refresh complete");
                self.cache.store(key, resource, rows, generation);
            }
            Err(e) => {
                e.log();
                self.cache.abort_refresh(key);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a record. On success every cached list for the resource is
    /// flagged stale.
    #[instrument(skip(self, fields), fields(resource = resource))]
    pub async fn create(&self, resource: &str, fields: Record) -> Result<Record> {
        let record = self.store.insert(resource, fields).await?;
        self.invalidate(resource);
        Ok(record)
    }

    /// Update a record by id. Coarse invalidation on success.
    #[instrument(skip(self, fields), fields(resource = resource, id = id))]
    pub async fn update(&self, resource: &str, id: &str, fields: Record) -> Result<Record> {
        let record = self.store.update(resource, id, fields).await?;
        self.invalidate(resource);
        Ok(record)
    }

    /// Delete a record by id. Coarse invalidation on success.
    #[instrument(skip(self), fields(resource = resource, id = id))]
    pub async fn remove(&self, resource: &str, id: &str) -> Result<()> {
        self.store.delete(resource, id).await?;
        self.invalidate(resource);
        Ok(())
    }

    /// Flag every cached list for a resource stale, regardless of which
    /// options produced it.
    pub fn invalidate(&self, resource: &str) {
        let flagged = self.cache.mark_resource_stale(resource);
        debug!(resource = resource, flagged = flagged, "Cache invalidated");
    }

    /// Cache statistics.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBackend;
    use serde_json::json;

    fn record(pairs: &[(&str, serde_json::Value)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn gateway() -> DataGateway {
        DataGateway::new(Arc::new(MemoryBackend::new()), &CacheConfig::default())
    }

    #[tokio::test]
    async fn test_list_caches_by_options() {
        let gw = gateway();
        gw.create("dealers", record(&[("name", json!("Acme Agro"))]))
            .await
            .unwrap();

        let opts = QueryOptions::new();
        gw.list("dealers", &opts).await.unwrap();
        gw.list("dealers", &opts).await.unwrap();

        let stats = gw.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_write_invalidates_every_key_for_resource() {
        let gw = gateway();
        gw.create("dealers", record(&[("name", json!("Acme Agro")), ("city", json!("Pune"))]))
            .await
            .unwrap();

        // Two differently-filtered cached lists for the same resource.
        let all = QueryOptions::new();
        let filtered = QueryOptions::new().filter("city", json!("Pune"));
        gw.list("dealers", &all).await.unwrap();
        gw.list("dealers", &filtered).await.unwrap();

        gw.create("dealers", record(&[("name", json!("Bharat Seeds"))]))
            .await
            .unwrap();

        // Both keys are stale now; reads still answer from cache immediately.
        let rows = gw.list("dealers", &all).await.unwrap();
        assert_eq!(rows.len(), 1, "stale-while-revalidate returns old rows");
        let stats = gw.cache_stats();
        assert!(stats.stale_hits >= 1);
    }

    #[tokio::test]
    async fn test_stale_entry_refreshes_in_background() {
        let gw = gateway();
        let opts = QueryOptions::new();

        gw.create("orders", record(&[("status", json!("pending"))]))
            .await
            .unwrap();
        gw.list("orders", &opts).await.unwrap();
        gw.create("orders", record(&[("status", json!("pending"))]))
            .await
            .unwrap();

        // Stale read triggers the refresh.
        let rows = gw.list("orders", &opts).await.unwrap();
        assert_eq!(rows.len(), 1);

        // Wait for the background task to land, then read fresh data.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let rows = gw.list("orders", &opts).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    /// Backend wrapper that, when armed, snapshots the rows and then parks
    /// the in-flight list() until released. Lets a test commit a write in
    /// the window between a refresh's fetch and its store.
    struct GatedStore {
        inner: MemoryBackend,
        armed: std::sync::atomic::AtomicBool,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl ResourceStore for GatedStore {
        async fn list(&self, resource: &str, options: &QueryOptions) -> Result<Vec<Record>> {
            let rows = self.inner.list(resource, options).await?;
            if self.armed.swap(false, std::sync::atomic::Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            Ok(rows)
        }

        async fn insert(&self, resource: &str, fields: Record) -> Result<Record> {
            self.inner.insert(resource, fields).await
        }

        async fn update(&self, resource: &str, id: &str, fields: Record) -> Result<Record> {
            self.inner.update(resource, id, fields).await
        }

        async fn delete(&self, resource: &str, id: &str) -> Result<()> {
            self.inner.delete(resource, id).await
        }
    }

    #[tokio::test]
    async fn test_write_during_refresh_is_not_lost() {
        let store = Arc::new(GatedStore {
            inner: MemoryBackend::new(),
            armed: std::sync::atomic::AtomicBool::new(false),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let gw = DataGateway::new(store.clone(), &CacheConfig::default());
        let opts = QueryOptions::new();

        gw.create("orders", record(&[("status", json!("pending"))]))
            .await
            .unwrap();
        gw.list("orders", &opts).await.unwrap();
        gw.create("orders", record(&[("status", json!("pending"))]))
            .await
            .unwrap();

        // This stale read spawns a refresh; the gate parks it after its
        // fetch already snapshotted two rows.
        store.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        let rows = gw.list("orders", &opts).await.unwrap();
        assert_eq!(rows.len(), 1);
        store.entered.notified().await;

        // A third order commits while the refresh is parked, then the
        // refresh lands with its two-row snapshot.
        gw.create("orders", record(&[("status", json!("pending"))]))
            .await
            .unwrap();
        store.release.notify_one();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        // The two-row snapshot must still read as stale, so this read
        // spawns another refresh rather than believing it.
        let rows = gw.list("orders", &opts).await.unwrap();
        assert_eq!(rows.len(), 2);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let rows = gw.list("orders", &opts).await.unwrap();
        assert_eq!(rows.len(), 3, "write landed during refresh must surface");
    }

    #[tokio::test]
    async fn test_invalidation_does_not_cross_resources() {
        let gw = gateway();
        gw.create("dealers", record(&[("name", json!("Acme Agro"))]))
            .await
            .unwrap();

        let opts = QueryOptions::new();
        gw.list("dealers", &opts).await.unwrap();
        gw.list("farmers", &opts).await.unwrap();

        gw.create("farmers", record(&[("name", json!("Ramesh"))]))
            .await
            .unwrap();

        // Dealers key untouched, farmers key stale.
        gw.list("dealers", &opts).await.unwrap();
        let stats = gw.cache_stats();
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_update_and_remove_invalidate() {
        let gw = gateway();
        let created = gw
            .create("dealers", record(&[("name", json!("Acme Agro"))]))
            .await
            .unwrap();
        let id = created.get("id").unwrap().as_str().unwrap().to_string();

        let opts = QueryOptions::new();
        gw.list("dealers", &opts).await.unwrap();

        gw.update("dealers", &id, record(&[("city", json!("Nashik"))]))
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        gw.list("dealers", &opts).await.unwrap(); // stale hit, spawns refresh
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let rows = gw.list("dealers", &opts).await.unwrap();
        assert_eq!(rows[0].get("city"), Some(&json!("Nashik")));

        gw.remove("dealers", &id).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        gw.list("dealers", &opts).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let rows = gw.list("dealers", &opts).await.unwrap();
        assert!(rows.is_empty());
    }
}
