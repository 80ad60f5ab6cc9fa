use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn, Instrument};

use super::WorkOrderService;
use crate::error::Result;
use crate::model::{
    derive_order_status, Job, JobEvent, JobId, JobStatus, JobTransitionRecord, OrderStatus,
    Resolution, WorkOrder,
};
use crate::notify::NotifyOutcome;
use crate::telemetry::{create_job_span, generate_correlation_id};

/// Result of a job transition and its effect on the owning order
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job: Job,
    pub transition: JobTransitionRecord,
    pub order_status: OrderStatus,
    /// Set when this transition closed the order
    #[serde(skip)]
    pub closure: Option<NotifyOutcome>,
    /// Set when the order closed but its output set could not be passed on.
    /// Assigning the same finished set again retries the hand-off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hand_off_failure: Option<String>,
}

/// What re-deriving an order's status changed beyond the status itself
#[derive(Default)]
struct OrderRefresh {
    closure: Option<NotifyOutcome>,
    hand_off_failure: Option<String>,
}

impl WorkOrderService {
    pub async fn start_job(&self, job_id: JobId) -> Result<JobReport> {
        self.transition_job(job_id, JobEvent::Start).await
    }

    pub async fn complete_job(&self, job_id: JobId, comment: Option<String>) -> Result<JobReport> {
        self.transition_job(job_id, JobEvent::Complete { comment }).await
    }

    pub async fn cancel_job(&self, job_id: JobId, comment: Option<String>) -> Result<JobReport> {
        self.transition_job(job_id, JobEvent::Cancel { comment }).await
    }

    pub async fn mark_job_broken(&self, job_id: JobId) -> Result<JobReport> {
        self.transition_job(job_id, JobEvent::Break).await
    }

    /// Manual resolution of a broken job into a closed state
    pub async fn resolve_broken_job(&self, job_id: JobId, outcome: Resolution) -> Result<JobReport> {
        self.transition_job(job_id, JobEvent::Resolve { outcome }).await
    }

    async fn transition_job(&self, job_id: JobId, event: JobEvent) -> Result<JobReport> {
        let correlation_id = generate_correlation_id();
        let span = create_job_span(job_id, event.verb(), &correlation_id);

        async move {
            let order_id = self.load_job(job_id).await?.order_id;
            let _guard = self.lock_order(order_id).await;

            let resolving = matches!(event, JobEvent::Resolve { .. });
            let mut job = self.load_job(job_id).await?;
            let transition = job.apply(event, Utc::now())?;
            self.store.update_job(&job).await?;

            let mut order = self.load_order(order_id).await?;
            let refresh = self.refresh_order(&mut order, &job, resolving).await?;

            Ok(JobReport {
                job,
                transition,
                order_status: order.status,
                closure: refresh.closure,
                hand_off_failure: refresh.hand_off_failure,
            })
        }
        .instrument(span)
        .await
    }

    /// Re-derive the order's status from its jobs and persist any change.
    /// Once the new status is stored, closing side effects are reported
    /// rather than raised: the job transition has already happened.
    async fn refresh_order(
        &self,
        order: &mut WorkOrder,
        changed: &Job,
        resolving: bool,
    ) -> Result<OrderRefresh> {
        let statuses: Vec<JobStatus> = self
            .store
            .load_jobs(order.id)
            .await?
            .iter()
            .map(Job::status)
            .collect();
        let derived = derive_order_status(order.status, &statuses, resolving);
        if derived == order.status {
            return Ok(OrderRefresh::default());
        }

        let previous = order.status;
        order.status = derived;
        order.updated_at = Utc::now();
        if derived.is_closed() && order.close_comment.is_none() {
            order.close_comment = changed.close_comment.clone();
        }
        self.store.update_order(order).await?;
        self.sets.invalidate_order(order).await;
        info!(order_id = %order.id, from = %previous, to = %derived, "Work order status changed");

        if derived == OrderStatus::Broken {
            warn!(order_id = %order.id, "Work order broken; needs manual intervention");
            return Ok(OrderRefresh::default());
        }
        if !derived.is_closed() {
            return Ok(OrderRefresh::default());
        }

        let closure = match self.load_plan(order.plan_id).await {
            Ok(plan) => Some(self.notifier.order_closed(&plan, order).await),
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Closure event skipped");
                None
            }
        };
        let hand_off_failure = match self.hand_off_output(order).await {
            Ok(()) => None,
            Err(e) => {
                warn!(order_id = %order.id, error = %e, "Output set hand-off failed");
                Some(e.to_string())
            }
        };
        Ok(OrderRefresh {
            closure,
            hand_off_failure,
        })
    }
}
