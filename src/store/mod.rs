//! Persistence of plan, order and job records
//!
//! Orders are unique on (plan, index) and jobs on (order, container). Batch
//! inserts are all-or-nothing: no other operation can observe a partial batch.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    ContainerId, Job, JobId, NewWorkOrder, NewWorkPlan, OrderId, PlanId, WorkOrder, WorkPlan,
};

pub use memory::MemoryWorkStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteWorkStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait WorkStore: Send + Sync {
    async fn create_plan(&self, plan: &NewWorkPlan) -> Result<WorkPlan, StoreError>;
    async fn update_plan(&self, plan: &WorkPlan) -> Result<(), StoreError>;
    async fn load_plan(&self, id: PlanId) -> Result<Option<WorkPlan>, StoreError>;

    /// Insert every order of a plan in one transaction
    async fn insert_orders(
        &self,
        plan_id: PlanId,
        orders: &[NewWorkOrder],
    ) -> Result<Vec<WorkOrder>, StoreError>;
    /// Orders of a plan sorted by index
    async fn load_orders(&self, plan_id: PlanId) -> Result<Vec<WorkOrder>, StoreError>;
    async fn load_order(&self, id: OrderId) -> Result<Option<WorkOrder>, StoreError>;
    async fn update_order(&self, order: &WorkOrder) -> Result<(), StoreError>;

    /// Insert one queued job per container in one transaction
    async fn insert_jobs(
        &self,
        order_id: OrderId,
        containers: &[ContainerId],
    ) -> Result<Vec<Job>, StoreError>;
    async fn load_jobs(&self, order_id: OrderId) -> Result<Vec<Job>, StoreError>;
    async fn load_job(&self, id: JobId) -> Result<Option<Job>, StoreError>;
    async fn update_job(&self, job: &Job) -> Result<(), StoreError>;
}
