use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::WorkOrderService;
use crate::error::{Result, WorkOrderError};
use crate::model::{
    ModuleChoice, ModuleSelection, NewWorkOrder, NewWorkPlan, PlanId, PlanStatus, Product,
    ProjectRef, SetId, WorkOrder, WorkPlan,
};
use crate::priority::Priority;
use crate::store::StoreError;

/// Free-text and scheduling details attached to a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDetails {
    pub comment: Option<String>,
    pub desired_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
}

/// A plan with its orders and derived status
#[derive(Debug, Clone, Serialize)]
pub struct PlanOverview {
    pub plan: WorkPlan,
    pub status: PlanStatus,
    pub orders: Vec<WorkOrder>,
    /// "<process> in progress" or "<process> <status>" for plans under way
    pub summary: String,
}

impl WorkOrderService {
    pub async fn create_plan(&self, owner_email: &str) -> Result<WorkPlan> {
        let new_plan = NewWorkPlan::new(owner_email);
        if new_plan.owner_email.is_empty() {
            return Err(WorkOrderError::Validation(
                "a work plan needs an owner".to_string(),
            ));
        }
        let plan = self.store.create_plan(&new_plan).await?;
        info!(plan_id = %plan.id, owner = %plan.owner_email, "Created work plan");
        Ok(plan)
    }

    /// Choose the starting set. It becomes the original set of the first order.
    pub async fn select_original_set(&self, plan_id: PlanId, set_id: SetId) -> Result<WorkPlan> {
        let mut plan = self.editable_plan(plan_id).await?;
        self.ensure_no_orders(&plan, "change the original set").await?;

        if self.sets.get(&set_id).await?.is_none() {
            return Err(WorkOrderError::Validation(format!(
                "set {set_id} does not exist"
            )));
        }

        plan.original_set_id = Some(set_id);
        self.save_plan(&mut plan).await?;
        Ok(plan)
    }

    pub async fn select_project(&self, plan_id: PlanId, project: ProjectRef) -> Result<WorkPlan> {
        let mut plan = self.editable_plan(plan_id).await?;
        plan.project = Some(project);
        self.save_plan(&mut plan).await?;
        Ok(plan)
    }

    pub async fn select_product(&self, plan_id: PlanId, product: Product) -> Result<WorkPlan> {
        let mut plan = self.editable_plan(plan_id).await?;
        self.ensure_no_orders(&plan, "change the product").await?;

        if product.processes.is_empty() {
            return Err(WorkOrderError::Validation(format!(
                "product {} has no processes",
                product.name
            )));
        }

        plan.product = Some(product);
        self.save_plan(&mut plan).await?;
        Ok(plan)
    }

    pub async fn set_request_details(
        &self,
        plan_id: PlanId,
        details: RequestDetails,
    ) -> Result<WorkPlan> {
        let mut plan = self.editable_plan(plan_id).await?;
        plan.comment = details.comment;
        plan.desired_date = details.desired_date;
        plan.priority = details.priority;
        self.save_plan(&mut plan).await?;
        Ok(plan)
    }

    /// Create one queued order per process of the plan's product.
    ///
    /// `selections[i]` lists the modules chosen for process `i`, in execution
    /// order. The first order receives the plan's original set and, when one
    /// already exists, a locked input set. Calling this again returns the
    /// existing orders unchanged.
    pub async fn create_orders(
        &self,
        plan_id: PlanId,
        selections: &[Vec<ModuleSelection>],
        locked_set: Option<SetId>,
    ) -> Result<Vec<WorkOrder>> {
        let plan = self.editable_plan(plan_id).await?;
        let product = plan.product.as_ref().ok_or_else(|| {
            WorkOrderError::Configuration("no product is selected".to_string())
        })?;

        if product.processes.len() != selections.len() {
            return Err(WorkOrderError::Validation(format!(
                "product {} has {} process(es) but {} module selection(s) were given",
                product.name,
                product.processes.len(),
                selections.len()
            )));
        }

        let existing = self.store.load_orders(plan_id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let mut new_orders = Vec::with_capacity(selections.len());
        for (index, (process, chosen)) in product.processes.iter().zip(selections).enumerate() {
            let mut module_choices = Vec::with_capacity(chosen.len());
            for (position, selection) in chosen.iter().enumerate() {
                let module = process.module(selection.module_id).ok_or_else(|| {
                    WorkOrderError::Validation(format!(
                        "module {} is not part of process {}",
                        selection.module_id, process.name
                    ))
                })?;
                module_choices.push(ModuleChoice {
                    module_id: module.id,
                    name: module.name.clone(),
                    selected_value: selection.selected_value,
                    position,
                });
            }

            let first = index == 0;
            new_orders.push(NewWorkOrder {
                uuid: Uuid::new_v4(),
                order_index: index,
                process: process.clone(),
                module_choices,
                original_set_id: if first { plan.original_set_id } else { None },
                set_id: if first { locked_set } else { None },
            });
        }

        let orders = match self.store.insert_orders(plan_id, &new_orders).await {
            Ok(orders) => orders,
            // A concurrent request created them first
            Err(StoreError::Conflict(_)) => return Ok(self.store.load_orders(plan_id).await?),
            Err(e) => return Err(e.into()),
        };

        info!(plan_id = %plan_id, orders = orders.len(), "Created work orders");
        for order in &orders {
            let _ = self.notifier.order_queued(&plan, order).await;
        }
        Ok(orders)
    }

    /// Cancel a plan that is under construction or under way
    pub async fn cancel_plan(&self, plan_id: PlanId) -> Result<WorkPlan> {
        let mut plan = self.load_plan(plan_id).await?;
        let orders = self.store.load_orders(plan_id).await?;
        let status = plan.status(&orders);

        if !status.is_cancellable() {
            return Err(WorkOrderError::Precondition(format!(
                "{} is {} and cannot be cancelled",
                plan.name(),
                status
            )));
        }

        plan.cancelled_at = Some(Utc::now());
        self.save_plan(&mut plan).await?;
        warn!(plan_id = %plan_id, "Work plan cancelled");
        Ok(plan)
    }

    pub async fn plan_status(&self, plan_id: PlanId) -> Result<PlanStatus> {
        let plan = self.load_plan(plan_id).await?;
        let orders = self.store.load_orders(plan_id).await?;
        Ok(plan.status(&orders))
    }

    pub async fn plan_overview(&self, plan_id: PlanId) -> Result<PlanOverview> {
        let plan = self.load_plan(plan_id).await?;
        let orders = self.store.load_orders(plan_id).await?;
        let status = plan.status(&orders);
        let summary = match status {
            PlanStatus::Active | PlanStatus::Broken => WorkPlan::active_summary(&orders),
            _ => String::new(),
        };

        Ok(PlanOverview {
            plan,
            status,
            orders,
            summary,
        })
    }

    async fn editable_plan(&self, plan_id: PlanId) -> Result<WorkPlan> {
        let plan = self.load_plan(plan_id).await?;
        if plan.is_cancelled() {
            return Err(WorkOrderError::Precondition(format!(
                "{} has been cancelled",
                plan.name()
            )));
        }
        Ok(plan)
    }

    async fn ensure_no_orders(&self, plan: &WorkPlan, action: &str) -> Result<()> {
        if !self.store.load_orders(plan.id).await?.is_empty() {
            return Err(WorkOrderError::Precondition(format!(
                "cannot {action}: {} already has work orders",
                plan.name()
            )));
        }
        Ok(())
    }

    async fn save_plan(&self, plan: &mut WorkPlan) -> Result<()> {
        plan.updated_at = Utc::now();
        self.store.update_plan(plan).await?;
        Ok(())
    }
}
