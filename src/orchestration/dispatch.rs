use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{error, info, warn, Instrument};

use super::partition::build_payload;
use super::WorkOrderService;
use crate::error::{Result, WorkOrderError};
use crate::model::{check_dispatchable, Job, JobId, OrderId, OrderStatus};
use crate::notify::NotifyOutcome;
use crate::observability::OperationTimer;
use crate::store::StoreError;
use crate::telemetry::{create_dispatch_span, generate_correlation_id};

/// Outcome of a successful dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub order_id: OrderId,
    /// Whether this dispatch locked or cloned a set
    pub newly_locked: bool,
    pub jobs: Vec<Job>,
    pub status: OrderStatus,
    #[serde(skip)]
    pub notification: NotifyOutcome,
}

impl WorkOrderService {
    /// Dispatch one order: lock its input set, create one job per container,
    /// push every job to the execution system, then mark the order active.
    ///
    /// Failures before job creation leave the order untouched and are safe to
    /// retry. A push failure after jobs were created is reported as
    /// [`WorkOrderError::PartialDispatch`] and the order stays queued.
    pub async fn dispatch(&self, order_id: OrderId) -> Result<DispatchReport> {
        let correlation_id = generate_correlation_id();
        let order = self.load_order(order_id).await?;
        let span = create_dispatch_span(order.plan_id, order_id, &correlation_id);

        self.metrics.record_attempt();
        let timer = OperationTimer::new("dispatch_work_order");
        let result = self.dispatch_locked(order_id).instrument(span).await;
        timer.finish();

        match &result {
            Ok(report) => self.metrics.record_success(report.jobs.len()),
            Err(e) => {
                self.metrics.record_failure();
                warn!(order_id = %order_id, correlation_id = %correlation_id, error = %e, "Dispatch failed");
            }
        }
        result
    }

    async fn dispatch_locked(&self, order_id: OrderId) -> Result<DispatchReport> {
        let _guard = self.lock_order(order_id).await;

        // Eligibility is re-read under the lock
        let mut order = self.load_order(order_id).await?;
        let plan = self.load_plan(order.plan_id).await?;
        let statuses: Vec<OrderStatus> = self
            .store
            .load_orders(plan.id)
            .await?
            .iter()
            .map(|o| o.status)
            .collect();
        check_dispatchable(plan.is_cancelled(), &statuses, order.order_index)
            .map_err(|reason| WorkOrderError::NotDispatchable { order_id, reason })?;

        if !self.store.load_jobs(order_id).await?.is_empty() {
            return Err(WorkOrderError::Consistency(format!(
                "{} already has jobs from an earlier dispatch attempt",
                order.name()
            )));
        }

        self.validate_modules(&order).await?;
        let newly_locked = self.finalise_order_set(&mut order).await?;
        let set_id = order.set_id.ok_or_else(|| {
            WorkOrderError::Consistency(format!("{} has no input set after locking", order.name()))
        })?;

        let job_plan = self.plan_jobs(&set_id).await?;
        let jobs = self
            .store
            .insert_jobs(order_id, &job_plan.container_ids())
            .await
            .map_err(|e| match e {
                StoreError::Conflict(msg) => WorkOrderError::Consistency(msg),
                other => other.into(),
            })?;
        info!(order_id = %order_id, jobs = jobs.len(), "Created jobs");

        let mut pushed: Vec<JobId> = Vec::with_capacity(jobs.len());
        let by_container: HashMap<_, _> = job_plan
            .containers
            .iter()
            .map(|c| (c.id.clone(), c))
            .collect();
        for (i, job) in jobs.iter().enumerate() {
            let Some(container) = by_container.get(&job.container_id) else {
                return Err(WorkOrderError::Consistency(format!(
                    "job {} references unknown container {}",
                    job.id, job.container_id
                )));
            };
            let payload = build_payload(&plan, &order, job, container, &job_plan);
            if let Err(e) = self.collaborators.gateway.submit_job(&payload).await {
                self.metrics.record_push_failure();
                error!(order_id = %order_id, job_id = %job.id, error = %e, "Failed to send job to LIMS");
                return Err(WorkOrderError::PartialDispatch {
                    order_id,
                    pushed,
                    failed: (job.id, e.to_string()),
                    unsent: jobs[i + 1..].iter().map(|j| j.id).collect(),
                });
            }
            pushed.push(job.id);
        }

        order.activate(Utc::now())?;
        self.store.update_order(&order).await?;
        self.sets.invalidate_order(&order).await;
        info!(order_id = %order_id, newly_locked, "Work order dispatched");

        let notification = self.notifier.order_submitted(&plan, &order).await;

        Ok(DispatchReport {
            order_id,
            newly_locked,
            jobs,
            status: order.status,
            notification,
        })
    }
}
