// In-process collaborators with call journals and fault injection.
// Used by the integration tests and by the `simulate` command.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::events::{BillingNotice, EventMessage, EventSink};
use super::lims::{ExecutionGateway, JobPayload};
use super::materials::{Container, Material, MaterialCatalog, Slot};
use super::modules::ModuleValidator;
use super::sample_sets::{MembersPage, SampleSet, SampleSetRegistry};
use super::ServiceError;
use crate::model::{ContainerId, MaterialId, SetId};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Calls received by [`InMemorySetRegistry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    Fetch(SetId),
    Lock(SetId),
    CloneLocked { source: SetId, name: String },
    CloneUnlocked { source: SetId, name: String },
    MembersPage { id: SetId, cursor: Option<String> },
}

impl RegistryCall {
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            RegistryCall::Lock(_) | RegistryCall::CloneLocked { .. } | RegistryCall::CloneUnlocked { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct StoredSet {
    set: SampleSet,
    members: Vec<MaterialId>,
}

#[derive(Debug, Default)]
struct RegistryState {
    sets: HashMap<SetId, StoredSet>,
    calls: Vec<RegistryCall>,
    ignore_locks: bool,
    unavailable: bool,
}

const REGISTRY: &str = "set registry";

#[derive(Debug)]
pub struct InMemorySetRegistry {
    state: Mutex<RegistryState>,
    page_size: usize,
}

impl Default for InMemorySetRegistry {
    fn default() -> Self {
        Self::new(100)
    }
}

impl InMemorySetRegistry {
    pub fn new(page_size: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            page_size: page_size.max(1),
        }
    }

    pub fn add_set(&self, name: &str, members: Vec<MaterialId>, locked: bool) -> SetId {
        let id = SetId::new_v4();
        self.insert_set(id, name, members, locked);
        id
    }

    pub fn insert_set(&self, id: SetId, name: &str, members: Vec<MaterialId>, locked: bool) {
        let set = SampleSet {
            id,
            name: name.to_string(),
            locked,
            size: members.len() as u64,
        };
        guard(&self.state).sets.insert(id, StoredSet { set, members });
    }

    pub fn set(&self, id: &SetId) -> Option<SampleSet> {
        guard(&self.state).sets.get(id).map(|s| s.set.clone())
    }

    pub fn set_count(&self) -> usize {
        guard(&self.state).sets.len()
    }

    pub fn calls(&self) -> Vec<RegistryCall> {
        guard(&self.state).calls.clone()
    }

    pub fn mutation_count(&self) -> usize {
        guard(&self.state).calls.iter().filter(|c| c.is_mutation()).count()
    }

    pub fn clear_calls(&self) {
        guard(&self.state).calls.clear();
    }

    /// Accept lock requests without locking, as a racing or faulty registry would
    pub fn ignore_locks(&self, ignore: bool) {
        guard(&self.state).ignore_locks = ignore;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        guard(&self.state).unavailable = unavailable;
    }

    fn clone_set(&self, source: &SetId, name: &str, locked: bool) -> Result<SampleSet, ServiceError> {
        let mut state = guard(&self.state);
        if state.unavailable {
            return Err(unavailable());
        }
        state.calls.push(if locked {
            RegistryCall::CloneLocked { source: *source, name: name.to_string() }
        } else {
            RegistryCall::CloneUnlocked { source: *source, name: name.to_string() }
        });
        let members = state
            .sets
            .get(source)
            .map(|s| s.members.clone())
            .ok_or_else(|| not_found(source))?;
        let set = SampleSet {
            id: SetId::new_v4(),
            name: name.to_string(),
            locked,
            size: members.len() as u64,
        };
        state.sets.insert(set.id, StoredSet { set: set.clone(), members });
        Ok(set)
    }
}

fn unavailable() -> ServiceError {
    ServiceError::Unavailable {
        service: REGISTRY,
        message: "registry is offline".to_string(),
    }
}

fn not_found(id: &SetId) -> ServiceError {
    ServiceError::NotFound {
        service: REGISTRY,
        id: id.to_string(),
    }
}

#[async_trait]
impl SampleSetRegistry for InMemorySetRegistry {
    async fn fetch(&self, id: &SetId) -> Result<SampleSet, ServiceError> {
        let mut state = guard(&self.state);
        if state.unavailable {
            return Err(unavailable());
        }
        state.calls.push(RegistryCall::Fetch(*id));
        state.sets.get(id).map(|s| s.set.clone()).ok_or_else(|| not_found(id))
    }

    async fn lock(&self, id: &SetId) -> Result<SampleSet, ServiceError> {
        let mut state = guard(&self.state);
        if state.unavailable {
            return Err(unavailable());
        }
        state.calls.push(RegistryCall::Lock(*id));
        let ignore = state.ignore_locks;
        let stored = state.sets.get_mut(id).ok_or_else(|| not_found(id))?;
        if !ignore {
            stored.set.locked = true;
        }
        Ok(stored.set.clone())
    }

    async fn clone_locked(&self, source: &SetId, name: &str) -> Result<SampleSet, ServiceError> {
        self.clone_set(source, name, true)
    }

    async fn clone_unlocked(&self, source: &SetId, name: &str) -> Result<SampleSet, ServiceError> {
        self.clone_set(source, name, false)
    }

    async fn members_page(
        &self,
        id: &SetId,
        cursor: Option<String>,
    ) -> Result<MembersPage, ServiceError> {
        let mut state = guard(&self.state);
        if state.unavailable {
            return Err(unavailable());
        }
        state.calls.push(RegistryCall::MembersPage { id: *id, cursor: cursor.clone() });
        let members = &state.sets.get(id).ok_or_else(|| not_found(id))?.members;

        let start = match cursor {
            Some(c) => c.parse::<usize>().map_err(|_| ServiceError::UnexpectedResponse {
                service: REGISTRY,
                message: format!("bad cursor {c}"),
            })?,
            None => 0,
        };
        let end = (start + self.page_size).min(members.len());
        let ids = members.get(start..end).map(<[MaterialId]>::to_vec).unwrap_or_default();
        let next_cursor = (end < members.len()).then(|| end.to_string());
        Ok(MembersPage { ids, next_cursor })
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    materials: HashMap<MaterialId, Material>,
    containers: Vec<Container>,
    calls: usize,
}

/// Material catalog backed by maps
#[derive(Debug, Default)]
pub struct InMemoryMaterialCatalog {
    state: Mutex<CatalogState>,
}

impl InMemoryMaterialCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_material(&self, id: &str, available: bool, attributes: Map<String, Value>) -> MaterialId {
        let material = Material {
            id: MaterialId::from(id),
            available,
            attributes,
        };
        let id = material.id.clone();
        guard(&self.state).materials.insert(id.clone(), material);
        id
    }

    pub fn set_available(&self, id: &MaterialId, available: bool) {
        if let Some(m) = guard(&self.state).materials.get_mut(id) {
            m.available = available;
        }
    }

    pub fn add_container(&self, container: Container) {
        guard(&self.state).containers.push(container);
    }

    /// Build a container whose slots A1, A2, ... hold `materials` in order
    pub fn add_plate(&self, id: &str, materials: &[MaterialId]) -> ContainerId {
        let slots = materials
            .iter()
            .enumerate()
            .map(|(i, m)| Slot {
                address: format!("A{}", i + 1),
                material_id: Some(m.clone()),
            })
            .collect();
        let container = Container {
            id: ContainerId::from(id),
            barcode: format!("BC-{id}"),
            num_of_rows: 8,
            num_of_cols: 12,
            slots,
        };
        let id = container.id.clone();
        self.add_container(container);
        id
    }

    pub fn call_count(&self) -> usize {
        guard(&self.state).calls
    }
}

#[async_trait]
impl MaterialCatalog for InMemoryMaterialCatalog {
    async fn resolve_materials(&self, ids: &[MaterialId]) -> Result<Vec<Material>, ServiceError> {
        let mut state = guard(&self.state);
        state.calls += 1;
        Ok(ids.iter().filter_map(|id| state.materials.get(id).cloned()).collect())
    }

    async fn resolve_containers_containing(
        &self,
        ids: &[MaterialId],
    ) -> Result<Vec<Container>, ServiceError> {
        let mut state = guard(&self.state);
        state.calls += 1;
        let wanted: HashSet<MaterialId> = ids.iter().cloned().collect();
        Ok(state
            .containers
            .iter()
            .filter(|c| c.holds_any(&wanted))
            .cloned()
            .collect())
    }
}

/// Module validator accepting a fixed list of (normalised) names
#[derive(Debug, Default)]
pub struct StaticModuleValidator {
    valid: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl StaticModuleValidator {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            valid: names
                .into_iter()
                .map(|n| super::modules::normalise_module_name(n.as_ref()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn checked_names(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }
}

#[async_trait]
impl ModuleValidator for StaticModuleValidator {
    async fn is_valid_module_name(&self, name: &str) -> Result<bool, ServiceError> {
        guard(&self.calls).push(name.to_string());
        Ok(self.valid.contains(name))
    }
}

#[derive(Debug, Default)]
struct SinkState {
    events: Vec<EventMessage>,
    billing: Vec<BillingNotice>,
    failing: bool,
}

/// Event sink that keeps everything it receives
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    state: Mutex<SinkState>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        guard(&self.state).failing = failing;
    }

    pub fn events(&self) -> Vec<EventMessage> {
        guard(&self.state).events.clone()
    }

    pub fn billing_notices(&self) -> Vec<BillingNotice> {
        guard(&self.state).billing.clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        guard(&self.state).events.iter().map(|e| e.event_type.clone()).collect()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, message: &EventMessage) -> Result<(), ServiceError> {
        let mut state = guard(&self.state);
        if state.failing {
            return Err(ServiceError::Unavailable {
                service: "event broker",
                message: "broker connection closed".to_string(),
            });
        }
        state.events.push(message.clone());
        Ok(())
    }

    async fn notify_billing(&self, notice: &BillingNotice) -> Result<(), ServiceError> {
        let mut state = guard(&self.state);
        if state.failing {
            return Err(ServiceError::Unavailable {
                service: "billing",
                message: "billing service unreachable".to_string(),
            });
        }
        state.billing.push(notice.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    submitted: Vec<JobPayload>,
    rejected_containers: HashSet<ContainerId>,
}

/// Execution gateway that records submitted jobs and can reject chosen containers
#[derive(Debug, Default)]
pub struct RecordingGateway {
    state: Mutex<GatewayState>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_container(&self, id: &ContainerId) {
        guard(&self.state).rejected_containers.insert(id.clone());
    }

    pub fn submitted(&self) -> Vec<JobPayload> {
        guard(&self.state).submitted.clone()
    }
}

#[async_trait]
impl ExecutionGateway for RecordingGateway {
    async fn submit_job(&self, payload: &JobPayload) -> Result<(), ServiceError> {
        let mut state = guard(&self.state);
        if state.rejected_containers.contains(&payload.container.container_id) {
            return Err(ServiceError::UnexpectedResponse {
                service: "execution gateway",
                message: "HTTP 502: bad gateway".to_string(),
            });
        }
        state.submitted.push(payload.clone());
        Ok(())
    }
}
