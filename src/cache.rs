use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::CacheConfig;
use crate::external::{SampleSet, SampleSetRegistry, ServiceError};
use crate::model::{SetId, WorkOrder};
use crate::observability::DispatchMetrics;

/// Read-through cache in front of the sample-set registry.
///
/// Only display and reporting paths read through the cache. The locking
/// protocol always calls `fetch_fresh`, which bypasses cached entries and
/// refreshes them with what the registry returned.
#[derive(Clone)]
pub struct SampleSetCache {
    registry: Arc<dyn SampleSetRegistry>,
    cache: Cache<SetId, SampleSet>,
    metrics: Arc<DispatchMetrics>,
}

impl std::fmt::Debug for SampleSetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSetCache")
            .field("entries", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

impl SampleSetCache {
    pub fn new(
        registry: Arc<dyn SampleSetRegistry>,
        config: &CacheConfig,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.set_ttl_seconds))
            .build();

        Self {
            registry,
            cache,
            metrics,
        }
    }

    pub fn registry(&self) -> &dyn SampleSetRegistry {
        self.registry.as_ref()
    }

    /// Cached lookup; a set the registry does not know is `None`
    pub async fn get(&self, id: &SetId) -> Result<Option<SampleSet>, ServiceError> {
        if let Some(cached) = self.cache.get(id).await {
            debug!(set_id = %id, "Set cache hit");
            self.metrics.record_cache_hit();
            return Ok(Some(cached));
        }

        self.metrics.record_cache_miss();
        match self.registry.fetch(id).await {
            Ok(set) => {
                self.cache.insert(*id, set.clone()).await;
                Ok(Some(set))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch straight from the registry and refresh the cached copy
    pub async fn fetch_fresh(&self, id: &SetId) -> Result<SampleSet, ServiceError> {
        match self.registry.fetch(id).await {
            Ok(set) => {
                self.cache.insert(*id, set.clone()).await;
                Ok(set)
            }
            Err(e) => {
                self.cache.invalidate(id).await;
                Err(e)
            }
        }
    }

    /// Remember a set returned by a registry mutation
    pub async fn store(&self, set: &SampleSet) {
        self.cache.insert(set.id, set.clone()).await;
    }

    pub async fn invalidate(&self, id: &SetId) {
        self.cache.invalidate(id).await;
    }

    /// Drop every cached set an order references
    pub async fn invalidate_order(&self, order: &WorkOrder) {
        for id in [order.original_set_id, order.set_id, order.finished_set_id]
            .into_iter()
            .flatten()
        {
            self.cache.invalidate(&id).await;
        }
        debug!(order_id = %order.id, "Invalidated cached sets for order");
    }
}
