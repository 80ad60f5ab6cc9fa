//! Execution gateway: the downstream LIMS that receives dispatched jobs

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::ServiceError;
use crate::model::{ContainerId, JobId, MaterialId, OrderId};
use crate::priority::Priority;

/// Everything the execution system needs to run one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: JobId,
    pub job_uuid: Uuid,
    pub work_order_id: OrderId,
    pub process_name: String,
    pub process_uuid: Uuid,
    /// Module names in execution order
    pub modules: Vec<String>,
    pub materials: Vec<MaterialPayload>,
    pub container: ContainerPayload,
    pub project_uuid: Option<Uuid>,
    pub project_name: Option<String>,
    pub cost_code: Option<String>,
    pub comment: Option<String>,
    pub desired_date: Option<NaiveDate>,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialPayload {
    #[serde(rename = "_id")]
    pub id: MaterialId,
    pub address: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerPayload {
    pub container_id: ContainerId,
    pub barcode: String,
    pub num_of_rows: u32,
    pub num_of_cols: u32,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Push one job. Failures are reported to the caller and never retried here.
    async fn submit_job(&self, payload: &JobPayload) -> Result<(), ServiceError>;
}
