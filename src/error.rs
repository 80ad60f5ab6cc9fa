use thiserror::Error;

use crate::external::ServiceError;
use crate::model::{DispatchRejection, JobId, OrderId};
use crate::store::StoreError;

/// Errors raised by plan, order and job operations
#[derive(Debug, Error)]
pub enum WorkOrderError {
    /// A required reference is missing (no set to lock, no product selected)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request itself is invalid (unknown module, malformed selection)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced samples or records are not in a usable state
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("External service error: {0}")]
    ExternalService(#[from] ServiceError),

    /// A remote mutation could not be verified; needs operator attention
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Work order {order_id} cannot be dispatched: {reason}")]
    NotDispatchable {
        order_id: OrderId,
        reason: DispatchRejection,
    },

    #[error("Invalid transition: cannot {event} a {entity} that is {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        event: String,
    },

    /// Jobs were persisted but not all of them reached the execution system.
    /// Pushing stops at the first failure; the order is left queued for an
    /// operator to reconcile.
    #[error("Work order {order_id} partially dispatched: {} job(s) pushed, job {} failed ({}), {} not sent", .pushed.len(), .failed.0, .failed.1, .unsent.len())]
    PartialDispatch {
        order_id: OrderId,
        pushed: Vec<JobId>,
        failed: (JobId, String),
        unsent: Vec<JobId>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl WorkOrderError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        WorkOrderError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may retry the whole operation later.
    ///
    /// External-service failures abort before any status change, so the
    /// dispatch can be attempted again. Everything else needs a different
    /// request or an operator.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkOrderError::ExternalService(_))
    }
}

pub type Result<T, E = WorkOrderError> = std::result::Result<T, E>;
