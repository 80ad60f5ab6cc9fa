// Lab work-order orchestration
// Exposes the core components for the CLI, testing and integration

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod external;
pub mod model;
pub mod notify;
pub mod observability;
pub mod orchestration;
pub mod priority;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use cache::SampleSetCache;
pub use config::{config, init_config, WorkOrdersConfig};
pub use error::{Result, WorkOrderError};
pub use external::{Collaborators, ServiceError};
pub use model::{
    Job, JobEvent, JobStatus, OrderStatus, PlanStatus, Resolution, WorkOrder, WorkPlan,
};
pub use notify::{Notifier, NotifyOutcome};
pub use observability::{DispatchMetrics, DispatchStats, OperationTimer};
pub use orchestration::{DispatchReport, JobReport, PlanOverview, RequestDetails, WorkOrderService};
pub use priority::Priority;
pub use store::{MemoryWorkStore, StoreError, WorkStore};
pub use telemetry::{generate_correlation_id, init_telemetry};
