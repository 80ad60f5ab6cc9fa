//! External collaborator abstractions
//!
//! Every remote system the orchestrator talks to sits behind a trait so it can
//! be passed in explicitly and substituted in tests: the sample-set registry,
//! the material catalog, the module validator, the event sink and the
//! execution gateway (LIMS).

pub mod error;
pub mod events;
pub mod http;
pub mod lims;
pub mod materials;
pub mod memory;
pub mod modules;
pub mod sample_sets;

use std::sync::Arc;

pub use error::ServiceError;
pub use events::{BillingNotice, EventMessage, EventRole, EventSink, LogEventSink};
pub use http::{HttpExecutionGateway, HttpModuleValidator};
pub use lims::{ContainerPayload, ExecutionGateway, JobPayload, MaterialPayload};
pub use materials::{Container, Material, MaterialCatalog, Slot};
pub use modules::{normalise_module_name, ModuleValidator};
pub use sample_sets::{all_members, MembersPage, SampleSet, SampleSetRegistry};

/// The set of external systems a work-order service depends on
#[derive(Clone)]
pub struct Collaborators {
    pub registry: Arc<dyn SampleSetRegistry>,
    pub catalog: Arc<dyn MaterialCatalog>,
    pub validator: Arc<dyn ModuleValidator>,
    pub events: Arc<dyn EventSink>,
    pub gateway: Arc<dyn ExecutionGateway>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
