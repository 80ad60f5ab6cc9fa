//! Work-order orchestration
//!
//! [`WorkOrderService`] owns every operation that changes plans, orders and
//! jobs. Its operations are split by concern across the submodules:
//! plan construction, set locking, job partitioning, dispatch, job
//! transitions and order maintenance.
//!
//! Every operation that mutates an order (dispatch, set locking, job
//! transitions) holds that order's mutex for its whole run, so two requests
//! for the same order never interleave.

mod dispatch;
mod jobs;
mod locking;
mod orders;
mod partition;
mod plans;

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::cache::SampleSetCache;
use crate::config::WorkOrdersConfig;
use crate::error::{Result, WorkOrderError};
use crate::external::Collaborators;
use crate::model::{Job, JobId, OrderId, PlanId, WorkOrder, WorkPlan};
use crate::notify::Notifier;
use crate::observability::DispatchMetrics;
use crate::store::WorkStore;

pub use dispatch::DispatchReport;
pub use jobs::JobReport;
pub use partition::{group_by_container, JobPlan};
pub use plans::{PlanOverview, RequestDetails};

pub struct WorkOrderService {
    store: Arc<dyn WorkStore>,
    sets: SampleSetCache,
    collaborators: Collaborators,
    notifier: Notifier,
    metrics: Arc<DispatchMetrics>,
    order_locks: OrderLocks,
}

type OrderLocks = StdMutex<HashMap<OrderId, Arc<Mutex<()>>>>;

/// Holds one order's mutex. Dropping the last holder removes the order's
/// entry, so the lock table only tracks orders that are in use.
pub(crate) struct OrderGuard<'a> {
    locks: &'a OrderLocks,
    id: OrderId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for OrderGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters hold their own clone of the Arc until they get the lock
        if locks.get(&self.id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for WorkOrderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkOrderService")
            .field("sets", &self.sets)
            .field("notifier", &self.notifier)
            .finish_non_exhaustive()
    }
}

impl WorkOrderService {
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn WorkStore>,
        config: &WorkOrdersConfig,
    ) -> Self {
        let metrics = Arc::new(DispatchMetrics::new());
        let sets = SampleSetCache::new(
            collaborators.registry.clone(),
            &config.cache,
            metrics.clone(),
        );
        let notifier = Notifier::new(
            collaborators.events.clone(),
            sets.clone(),
            config.events.clone(),
            metrics.clone(),
        );

        Self {
            store,
            sets,
            collaborators,
            notifier,
            metrics,
            order_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    pub fn store(&self) -> &dyn WorkStore {
        self.store.as_ref()
    }

    pub async fn load_plan(&self, id: PlanId) -> Result<WorkPlan> {
        self.store
            .load_plan(id)
            .await?
            .ok_or_else(|| WorkOrderError::not_found("work plan", id))
    }

    pub async fn load_order(&self, id: OrderId) -> Result<WorkOrder> {
        self.store
            .load_order(id)
            .await?
            .ok_or_else(|| WorkOrderError::not_found("work order", id))
    }

    pub async fn load_job(&self, id: JobId) -> Result<Job> {
        self.store
            .load_job(id)
            .await?
            .ok_or_else(|| WorkOrderError::not_found("job", id))
    }

    pub async fn load_orders(&self, plan_id: PlanId) -> Result<Vec<WorkOrder>> {
        Ok(self.store.load_orders(plan_id).await?)
    }

    pub async fn load_jobs(&self, order_id: OrderId) -> Result<Vec<Job>> {
        Ok(self.store.load_jobs(order_id).await?)
    }

    /// Exclusive access to one order for the lifetime of the guard
    async fn lock_order(&self, id: OrderId) -> OrderGuard<'_> {
        let lock = {
            let mut locks = self.order_locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(id).or_default().clone()
        };
        OrderGuard {
            locks: &self.order_locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Orders whose mutex is currently held or awaited
    pub fn locked_order_count(&self) -> usize {
        self.order_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::memory::{
        InMemoryMaterialCatalog, InMemorySetRegistry, RecordingEventSink, RecordingGateway,
        StaticModuleValidator,
    };
    use crate::store::MemoryWorkStore;

    fn service() -> WorkOrderService {
        let collaborators = Collaborators {
            registry: Arc::new(InMemorySetRegistry::new(3)),
            catalog: Arc::new(InMemoryMaterialCatalog::new()),
            validator: Arc::new(StaticModuleValidator::new(["Quantification"])),
            events: Arc::new(RecordingEventSink::new()),
            gateway: Arc::new(RecordingGateway::new()),
        };
        WorkOrderService::new(
            collaborators,
            Arc::new(MemoryWorkStore::new()),
            &WorkOrdersConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_released_order_lock_is_forgotten() {
        let service = service();
        let guard = service.lock_order(OrderId(7)).await;
        assert_eq!(service.locked_order_count(), 1);
        drop(guard);
        assert_eq!(service.locked_order_count(), 0);
    }

    #[tokio::test]
    async fn test_waiting_order_lock_survives_release() {
        let service = service();
        let first = service.lock_order(OrderId(7)).await;

        let (_, second) = tokio::join!(
            async move {
                tokio::task::yield_now().await;
                drop(first);
            },
            service.lock_order(OrderId(7))
        );
        assert_eq!(service.locked_order_count(), 1);

        drop(second);
        assert_eq!(service.locked_order_count(), 0);
    }
}
