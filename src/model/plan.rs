use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::{Product, ProjectRef};
use super::ids::{PlanId, SetId};
use super::order::WorkOrder;
use super::status::{derive_plan_status, PlanStatus};
use crate::priority::Priority;

/// A user's end-to-end request: a product applied to a starting sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkPlan {
    pub id: PlanId,
    pub uuid: Uuid,
    pub owner_email: String,
    pub product: Option<Product>,
    pub project: Option<ProjectRef>,
    /// The set chosen by the user; becomes the original set of the first order
    pub original_set_id: Option<SetId>,
    pub comment: Option<String>,
    pub desired_date: Option<NaiveDate>,
    pub priority: Priority,
    /// Cancellation marker
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a plan before the store assigns its durable id
#[derive(Debug, Clone)]
pub struct NewWorkPlan {
    pub uuid: Uuid,
    pub owner_email: String,
}

impl NewWorkPlan {
    pub fn new(owner_email: &str) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            owner_email: sanitise_owner(owner_email),
        }
    }
}

/// Owner identifiers are compared case-insensitively, so store them lower-cased and trimmed
pub fn sanitise_owner(owner: &str) -> String {
    owner.trim().to_lowercase()
}

impl WorkPlan {
    pub fn name(&self) -> String {
        format!("Work plan {}", self.id)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }

    /// Product and project are both chosen
    pub fn is_configured(&self) -> bool {
        self.product.is_some() && self.project.is_some()
    }

    /// Derive the plan status from a snapshot of its orders
    pub fn status(&self, orders: &[WorkOrder]) -> PlanStatus {
        let statuses: Vec<_> = orders.iter().map(|o| o.status).collect();
        derive_plan_status(self.is_cancelled(), self.is_configured(), &statuses)
    }

    /// One-line progress summary for plans in progress: the active order's
    /// process "in progress", else the last closed order's process and status.
    pub fn active_summary(orders: &[WorkOrder]) -> String {
        if let Some(active) = orders.iter().find(|o| o.is_active()) {
            return format!("{} in progress", active.process.name);
        }
        orders
            .iter()
            .rev()
            .find(|o| o.is_closed())
            .map(|o| format!("{} {}", o.process.name, o.status))
            .unwrap_or_default()
    }
}
