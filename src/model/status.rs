// Derived statuses for plans, orders and jobs.
//
// Every function here is pure: callers load a snapshot of child statuses and
// the status is computed on demand, never cached on the parent record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a work plan, derived from its cancellation marker and its orders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    /// Not yet underway: no product/project chosen, no orders, or every order still queued
    Construction,
    /// At least one order has left the queue and the plan is not finished
    Active,
    /// Every order is closed
    Closed,
    /// One of the orders is broken and needs manual intervention
    Broken,
    /// The plan carries a cancellation marker
    Cancelled,
}

impl PlanStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanStatus::Construction => "construction",
            PlanStatus::Active => "active",
            PlanStatus::Closed => "closed",
            PlanStatus::Broken => "broken",
            PlanStatus::Cancelled => "cancelled",
        }
    }

    /// Plans may only be cancelled before they finish or break
    pub fn is_cancellable(self) -> bool {
        matches!(self, PlanStatus::Active | PlanStatus::Construction)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a work order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created with its plan, waiting to be dispatched
    Queued,
    /// Dispatched; jobs exist and not all of them are closed
    Active,
    /// Processing failed and the state could not be recovered automatically
    Broken,
    /// Legacy closed state, kept for records written before `Concluded`
    Completed,
    /// Legacy closed state, kept for records written before `Concluded`
    Cancelled,
    /// Every job has been completed or cancelled
    Concluded,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Queued => "queued",
            OrderStatus::Active => "active",
            OrderStatus::Broken => "broken",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Concluded => "concluded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(OrderStatus::Queued),
            "active" => Some(OrderStatus::Active),
            "broken" => Some(OrderStatus::Broken),
            "completed" => Some(OrderStatus::Completed),
            "cancelled" => Some(OrderStatus::Cancelled),
            "concluded" => Some(OrderStatus::Concluded),
            _ => None,
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Cancelled | OrderStatus::Concluded
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Active,
    Completed,
    Cancelled,
    /// Needs manual resolution to `Completed` or `Cancelled`
    Broken,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Active => "active",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Broken => "broken",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derive a plan's status. Priority order matters: cancellation beats
/// everything, a single broken order beats closure, and full closure beats
/// partial activity.
pub fn derive_plan_status(cancelled: bool, configured: bool, orders: &[OrderStatus]) -> PlanStatus {
    if cancelled {
        return PlanStatus::Cancelled;
    }
    if !configured || orders.is_empty() {
        return PlanStatus::Construction;
    }
    if orders.iter().any(|s| *s == OrderStatus::Broken) {
        return PlanStatus::Broken;
    }
    if orders.iter().all(|s| s.is_closed()) {
        return PlanStatus::Closed;
    }
    if !orders.iter().all(|s| *s == OrderStatus::Queued) {
        return PlanStatus::Active;
    }
    PlanStatus::Construction
}

/// Derive an order's status from its jobs.
///
/// Queued orders have no jobs yet and closed orders are final. An active
/// order breaks as soon as one job breaks. A broken order only moves on when
/// `resolving` is set, i.e. the change came from an operator resolving a
/// broken job: it concludes once every job is closed, or resumes as active
/// once no broken job is left. Ordinary job progress never clears it.
pub fn derive_order_status(
    current: OrderStatus,
    jobs: &[JobStatus],
    resolving: bool,
) -> OrderStatus {
    if jobs.is_empty() {
        return current;
    }
    let any_broken = jobs.iter().any(|s| *s == JobStatus::Broken);
    let all_closed = jobs.iter().all(|s| s.is_closed());
    match current {
        OrderStatus::Active if any_broken => OrderStatus::Broken,
        OrderStatus::Active if all_closed => OrderStatus::Concluded,
        OrderStatus::Broken if resolving && all_closed => OrderStatus::Concluded,
        OrderStatus::Broken if resolving && !any_broken => OrderStatus::Active,
        _ => current,
    }
}

/// Why an order cannot be dispatched right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchRejection {
    PlanCancelled,
    NotQueued { status: OrderStatus },
    /// An earlier order in the plan is still open
    NotNextInSequence { blocking_index: usize },
    UnknownIndex { index: usize },
}

impl fmt::Display for DispatchRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchRejection::PlanCancelled => write!(f, "the work plan has been cancelled"),
            DispatchRejection::NotQueued { status } => {
                write!(f, "the work order is {status}, not queued")
            }
            DispatchRejection::NotNextInSequence { blocking_index } => write!(
                f,
                "order {blocking_index} in the plan must be closed first"
            ),
            DispatchRejection::UnknownIndex { index } => {
                write!(f, "the plan has no order at index {index}")
            }
        }
    }
}

/// Check whether the order at `index` may be dispatched, given the statuses
/// of all orders in the plan in sequence order.
pub fn check_dispatchable(
    plan_cancelled: bool,
    orders: &[OrderStatus],
    index: usize,
) -> Result<(), DispatchRejection> {
    if plan_cancelled {
        return Err(DispatchRejection::PlanCancelled);
    }
    let status = *orders
        .get(index)
        .ok_or(DispatchRejection::UnknownIndex { index })?;
    if status != OrderStatus::Queued {
        return Err(DispatchRejection::NotQueued { status });
    }
    match orders.iter().position(|s| !s.is_closed()) {
        Some(first_open) if first_open == index => Ok(()),
        Some(first_open) => Err(DispatchRejection::NotNextInSequence {
            blocking_index: first_open,
        }),
        // Unreachable: the order itself is queued and therefore open
        None => Err(DispatchRejection::NotQueued { status }),
    }
}

pub fn can_be_dispatched(plan_cancelled: bool, orders: &[OrderStatus], index: usize) -> bool {
    check_dispatchable(plan_cancelled, orders, index).is_ok()
}
