// Plan, order and job records plus their derived statuses

pub mod catalog;
pub mod ids;
pub mod job;
pub mod order;
pub mod plan;
pub mod status;

pub use catalog::{ModuleSelection, Process, ProcessModule, Product, ProjectRef};
pub use ids::{ContainerId, JobId, MaterialId, OrderId, PlanId, SetId};
pub use job::{Job, JobEvent, JobTransitionRecord, Resolution};
pub use order::{ModuleChoice, NewWorkOrder, WorkOrder};
pub use plan::{NewWorkPlan, WorkPlan};
pub use status::{
    can_be_dispatched, check_dispatchable, derive_order_status, derive_plan_status,
    DispatchRejection, JobStatus, OrderStatus, PlanStatus,
};
