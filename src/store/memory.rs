use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{StoreError, WorkStore};
use crate::model::{
    ContainerId, Job, JobId, NewWorkOrder, NewWorkPlan, OrderId, OrderStatus, PlanId, WorkOrder,
    WorkPlan,
};
use crate::priority::Priority;

#[derive(Debug, Default)]
struct MemoryState {
    plans: BTreeMap<PlanId, WorkPlan>,
    orders: BTreeMap<OrderId, WorkOrder>,
    jobs: BTreeMap<JobId, Job>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Work store held in process memory. Each batch insert runs under one write
/// lock, so readers never see half of a batch.
#[derive(Debug, Default)]
pub struct MemoryWorkStore {
    state: RwLock<MemoryState>,
}

impl MemoryWorkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(entity: &'static str, id: impl ToString) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

#[async_trait]
impl WorkStore for MemoryWorkStore {
    async fn create_plan(&self, plan: &NewWorkPlan) -> Result<WorkPlan, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let record = WorkPlan {
            id: PlanId(state.next_id()),
            uuid: plan.uuid,
            owner_email: plan.owner_email.clone(),
            product: None,
            project: None,
            original_set_id: None,
            comment: None,
            desired_date: None,
            priority: Priority::default(),
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        state.plans.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_plan(&self, plan: &WorkPlan) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let slot = state.plans.get_mut(&plan.id).ok_or_else(|| missing("work plan", plan.id))?;
        *slot = plan.clone();
        Ok(())
    }

    async fn load_plan(&self, id: PlanId) -> Result<Option<WorkPlan>, StoreError> {
        Ok(self.state.read().await.plans.get(&id).cloned())
    }

    async fn insert_orders(
        &self,
        plan_id: PlanId,
        orders: &[NewWorkOrder],
    ) -> Result<Vec<WorkOrder>, StoreError> {
        let mut state = self.state.write().await;
        if !state.plans.contains_key(&plan_id) {
            return Err(missing("work plan", plan_id));
        }

        let mut taken: HashSet<usize> = state
            .orders
            .values()
            .filter(|o| o.plan_id == plan_id)
            .map(|o| o.order_index)
            .collect();
        for order in orders {
            if !taken.insert(order.order_index) {
                return Err(StoreError::Conflict(format!(
                    "plan {plan_id} already has an order at index {}",
                    order.order_index
                )));
            }
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(orders.len());
        for order in orders {
            let record = WorkOrder {
                id: OrderId(state.next_id()),
                uuid: order.uuid,
                plan_id,
                order_index: order.order_index,
                process: order.process.clone(),
                module_choices: order.module_choices.clone(),
                original_set_id: order.original_set_id,
                set_id: order.set_id,
                finished_set_id: None,
                status: OrderStatus::Queued,
                dispatch_date: None,
                close_comment: None,
                created_at: now,
                updated_at: now,
            };
            state.orders.insert(record.id, record.clone());
            created.push(record);
        }
        Ok(created)
    }

    async fn load_orders(&self, plan_id: PlanId) -> Result<Vec<WorkOrder>, StoreError> {
        let state = self.state.read().await;
        let mut orders: Vec<WorkOrder> = state
            .orders
            .values()
            .filter(|o| o.plan_id == plan_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.order_index);
        Ok(orders)
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<WorkOrder>, StoreError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn update_order(&self, order: &WorkOrder) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let slot = state.orders.get_mut(&order.id).ok_or_else(|| missing("work order", order.id))?;
        *slot = order.clone();
        Ok(())
    }

    async fn insert_jobs(
        &self,
        order_id: OrderId,
        containers: &[ContainerId],
    ) -> Result<Vec<Job>, StoreError> {
        let mut state = self.state.write().await;
        if !state.orders.contains_key(&order_id) {
            return Err(missing("work order", order_id));
        }

        let mut taken: HashSet<&ContainerId> = state
            .jobs
            .values()
            .filter(|j| j.order_id == order_id)
            .map(|j| &j.container_id)
            .collect();
        for container in containers {
            if !taken.insert(container) {
                return Err(StoreError::Conflict(format!(
                    "order {order_id} already has a job for container {container}"
                )));
            }
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(containers.len());
        for container in containers {
            let job = Job {
                id: JobId(state.next_id()),
                uuid: Uuid::new_v4(),
                order_id,
                container_id: container.clone(),
                started_at: None,
                completed_at: None,
                cancelled_at: None,
                broken_at: None,
                close_comment: None,
                created_at: now,
            };
            state.jobs.insert(job.id, job.clone());
            created.push(job);
        }
        Ok(created)
    }

    async fn load_jobs(&self, order_id: OrderId) -> Result<Vec<Job>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .jobs
            .values()
            .filter(|j| j.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn load_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.state.read().await.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let slot = state.jobs.get_mut(&job.id).ok_or_else(|| missing("job", job.id))?;
        *slot = job.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Process;

    fn new_order(index: usize) -> NewWorkOrder {
        NewWorkOrder {
            uuid: Uuid::new_v4(),
            order_index: index,
            process: Process {
                id: 1,
                uuid: Uuid::new_v4(),
                name: "Sequencing".to_string(),
                turnaround_days: 3,
                modules: vec![],
            },
            module_choices: vec![],
            original_set_id: None,
            set_id: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_order_index_inserts_nothing() {
        let store = MemoryWorkStore::new();
        let plan = store.create_plan(&NewWorkPlan::new("owner@example.com")).await.unwrap();

        let err = store
            .insert_orders(plan.id, &[new_order(0), new_order(1), new_order(1)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert!(store.load_orders(plan.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_job_batch_is_all_or_nothing() {
        let store = MemoryWorkStore::new();
        let plan = store.create_plan(&NewWorkPlan::new("owner@example.com")).await.unwrap();
        let orders = store.insert_orders(plan.id, &[new_order(0)]).await.unwrap();
        let order_id = orders[0].id;

        let jobs = store
            .insert_jobs(order_id, &[ContainerId::from("p1"), ContainerId::from("p2")])
            .await
            .unwrap();
        assert_eq!(jobs.len(), 2);

        let err = store
            .insert_jobs(order_id, &[ContainerId::from("p3"), ContainerId::from("p1")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.load_jobs(order_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_orders_load_in_index_order() {
        let store = MemoryWorkStore::new();
        let plan = store.create_plan(&NewWorkPlan::new("owner@example.com")).await.unwrap();
        store
            .insert_orders(plan.id, &[new_order(1), new_order(0), new_order(2)])
            .await
            .unwrap();
        let indexes: Vec<usize> = store
            .load_orders(plan.id)
            .await
            .unwrap()
            .iter()
            .map(|o| o.order_index)
            .collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }
}
