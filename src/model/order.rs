use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::catalog::Process;
use super::ids::{OrderId, PlanId, SetId};
use super::status::OrderStatus;
use crate::error::{Result, WorkOrderError};

/// One stage of a work plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: OrderId,
    pub uuid: Uuid,
    pub plan_id: PlanId,
    /// Position within the plan, fixed at creation
    pub order_index: usize,
    pub process: Process,
    /// Chosen modules in execution order
    pub module_choices: Vec<ModuleChoice>,
    /// Read-only set supplied by the user (first order) or by the previous order's output
    pub original_set_id: Option<SetId>,
    /// Locked input set; never reassigned once it is locked
    pub set_id: Option<SetId>,
    /// Output set, assigned after completion
    pub finished_set_id: Option<SetId>,
    pub status: OrderStatus,
    pub dispatch_date: Option<DateTime<Utc>>,
    pub close_comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleChoice {
    pub module_id: i64,
    pub name: String,
    pub selected_value: Option<i64>,
    pub position: usize,
}

/// Fields of an order before the store assigns its durable id
#[derive(Debug, Clone)]
pub struct NewWorkOrder {
    pub uuid: Uuid,
    pub order_index: usize,
    pub process: Process,
    pub module_choices: Vec<ModuleChoice>,
    pub original_set_id: Option<SetId>,
    pub set_id: Option<SetId>,
}

impl WorkOrder {
    /// Display name, also used to name sets cloned for this order
    pub fn name(&self) -> String {
        format!("Work Order {}", self.id)
    }

    pub fn is_queued(&self) -> bool {
        self.status == OrderStatus::Queued
    }

    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    pub fn is_broken(&self) -> bool {
        self.status == OrderStatus::Broken
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    /// Module names in execution order
    pub fn module_names(&self) -> Vec<String> {
        let mut choices: Vec<&ModuleChoice> = self.module_choices.iter().collect();
        choices.sort_by_key(|c| c.position);
        choices.into_iter().map(|c| c.name.clone()).collect()
    }

    pub fn estimated_completion_date(&self) -> Option<NaiveDate> {
        let dispatched = self.dispatch_date?;
        Some((dispatched + Duration::days(i64::from(self.process.turnaround_days))).date_naive())
    }

    /// queued -> active, only reachable through a successful dispatch
    pub fn activate(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.status != OrderStatus::Queued {
            return Err(self.invalid("activate"));
        }
        self.status = OrderStatus::Active;
        self.dispatch_date = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Manual marker for an order whose state could not be recovered
    pub fn mark_broken(&mut self, at: DateTime<Utc>) -> Result<()> {
        if self.is_closed() || self.is_broken() {
            return Err(self.invalid("break"));
        }
        self.status = OrderStatus::Broken;
        self.updated_at = at;
        Ok(())
    }

    fn invalid(&self, event: &str) -> WorkOrderError {
        WorkOrderError::InvalidTransition {
            entity: "work order",
            from: self.status.to_string(),
            event: event.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(status: OrderStatus) -> WorkOrder {
        let now = Utc::now();
        WorkOrder {
            id: OrderId(4),
            uuid: Uuid::new_v4(),
            plan_id: PlanId(1),
            order_index: 0,
            process: Process {
                id: 1,
                uuid: Uuid::new_v4(),
                name: "Library prep".to_string(),
                turnaround_days: 5,
                modules: vec![],
            },
            module_choices: vec![
                ModuleChoice { module_id: 2, name: "Second".to_string(), selected_value: None, position: 1 },
                ModuleChoice { module_id: 1, name: "First".to_string(), selected_value: Some(3), position: 0 },
            ],
            original_set_id: None,
            set_id: None,
            finished_set_id: None,
            status,
            dispatch_date: None,
            close_comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_module_names_follow_position() {
        assert_eq!(order(OrderStatus::Queued).module_names(), vec!["First", "Second"]);
    }

    #[test]
    fn test_activation_only_from_queued() {
        let now = Utc::now();
        let mut queued = order(OrderStatus::Queued);
        queued.activate(now).unwrap();
        assert!(queued.is_active());
        assert_eq!(queued.dispatch_date, Some(now));

        let mut active = order(OrderStatus::Active);
        assert!(matches!(
            active.activate(now),
            Err(WorkOrderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_estimated_completion_uses_turnaround() {
        let mut o = order(OrderStatus::Queued);
        assert_eq!(o.estimated_completion_date(), None);
        let dispatched = DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z").unwrap().with_timezone(&Utc);
        o.activate(dispatched).unwrap();
        assert_eq!(
            o.estimated_completion_date(),
            NaiveDate::from_ymd_opt(2026, 3, 7)
        );
    }

    #[test]
    fn test_closed_orders_cannot_break() {
        let mut o = order(OrderStatus::Concluded);
        assert!(o.mark_broken(Utc::now()).is_err());
        let mut o = order(OrderStatus::Active);
        o.mark_broken(Utc::now()).unwrap();
        assert!(o.is_broken());
    }
}
