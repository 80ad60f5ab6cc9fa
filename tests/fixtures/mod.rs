//! Shared builders for the work-order integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use lab_work_orders::config::WorkOrdersConfig;
use lab_work_orders::external::memory::{
    InMemoryMaterialCatalog, InMemorySetRegistry, RecordingEventSink, RecordingGateway,
    StaticModuleValidator,
};
use lab_work_orders::external::Collaborators;
use lab_work_orders::model::{
    ContainerId, Job, JobId, MaterialId, ModuleSelection, NewWorkOrder, NewWorkPlan, OrderId,
    PlanId, Process, ProcessModule, Product, ProjectRef, SetId, WorkOrder, WorkPlan,
};
use lab_work_orders::orchestration::{RequestDetails, WorkOrderService};
use lab_work_orders::priority::Priority;
use lab_work_orders::store::{MemoryWorkStore, StoreError, WorkStore};

pub const OWNER: &str = "jeff@sanger.ac.uk";

/// A service wired to in-memory collaborators, with handles kept for assertions
pub struct Harness {
    pub registry: Arc<InMemorySetRegistry>,
    pub catalog: Arc<InMemoryMaterialCatalog>,
    pub validator: Arc<StaticModuleValidator>,
    pub events: Arc<RecordingEventSink>,
    pub gateway: Arc<RecordingGateway>,
    pub service: WorkOrderService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_modules(&["Quantification", "Library Prep", "HiSeq X", "Read Length"])
    }

    pub fn with_modules(valid_modules: &[&str]) -> Self {
        Self::build(valid_modules, Arc::new(MemoryWorkStore::new()))
    }

    pub fn with_store(store: Arc<dyn WorkStore>) -> Self {
        Self::build(&["Quantification", "Library Prep", "HiSeq X", "Read Length"], store)
    }

    fn build(valid_modules: &[&str], store: Arc<dyn WorkStore>) -> Self {
        let registry = Arc::new(InMemorySetRegistry::new(3));
        let catalog = Arc::new(InMemoryMaterialCatalog::new());
        let validator = Arc::new(StaticModuleValidator::new(valid_modules));
        let events = Arc::new(RecordingEventSink::new());
        let gateway = Arc::new(RecordingGateway::new());

        let collaborators = Collaborators {
            registry: registry.clone(),
            catalog: catalog.clone(),
            validator: validator.clone(),
            events: events.clone(),
            gateway: gateway.clone(),
        };
        let service = WorkOrderService::new(collaborators, store, &WorkOrdersConfig::default());

        Self {
            registry,
            catalog,
            validator,
            events,
            gateway,
            service,
        }
    }

    /// Register `count` available materials named m1..mN
    pub fn add_materials(&self, count: usize) -> Vec<MaterialId> {
        (1..=count)
            .map(|i| {
                self.catalog
                    .add_material(&format!("m{i}"), true, attributes(i))
            })
            .collect()
    }

    /// Ten materials on three containers holding 4, 4 and 2 of them, all in one unlocked set
    pub fn standard_set(&self) -> SetId {
        let materials = self.add_materials(10);
        self.catalog.add_plate("plate-1", &materials[0..4]);
        self.catalog.add_plate("plate-2", &materials[4..8]);
        self.catalog.add_plate("rack-3", &materials[8..10]);
        self.registry.add_set("starting set", materials, false)
    }

    /// A configured plan with its orders created, starting from `set_id`
    pub async fn plan_with_orders(&self, set_id: Option<SetId>) -> (WorkPlan, Vec<WorkOrder>) {
        let plan = self.service.create_plan(OWNER).await.unwrap();
        if let Some(set_id) = set_id {
            self.service.select_original_set(plan.id, set_id).await.unwrap();
        }
        self.service.select_project(plan.id, project()).await.unwrap();
        self.service.select_product(plan.id, product()).await.unwrap();
        self.service
            .set_request_details(plan.id, details())
            .await
            .unwrap();
        let orders = self
            .service
            .create_orders(plan.id, &selections(), None)
            .await
            .unwrap();
        let plan = self.service.load_plan(plan.id).await.unwrap();
        (plan, orders)
    }

    /// Start and complete every job of an order
    pub async fn complete_all_jobs(&self, order: &WorkOrder) {
        let jobs = self.service.load_jobs(order.id).await.unwrap();
        self.complete_jobs(&jobs).await;
    }

    /// Start and complete the given queued jobs
    pub async fn complete_jobs(&self, jobs: &[Job]) {
        for job in jobs {
            self.service.start_job(job.id).await.unwrap();
            self.service
                .complete_job(job.id, Some("all good".to_string()))
                .await
                .unwrap();
        }
    }
}

/// Memory store that can refuse updates to one order
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryWorkStore,
    refuse_order_updates: Mutex<Option<OrderId>>,
}

impl FlakyStore {
    pub fn refuse_updates_to(&self, order_id: Option<OrderId>) {
        *self.refuse_order_updates.lock().unwrap() = order_id;
    }
}

#[async_trait]
impl WorkStore for FlakyStore {
    async fn create_plan(&self, plan: &NewWorkPlan) -> Result<WorkPlan, StoreError> {
        self.inner.create_plan(plan).await
    }

    async fn update_plan(&self, plan: &WorkPlan) -> Result<(), StoreError> {
        self.inner.update_plan(plan).await
    }

    async fn load_plan(&self, id: PlanId) -> Result<Option<WorkPlan>, StoreError> {
        self.inner.load_plan(id).await
    }

    async fn insert_orders(
        &self,
        plan_id: PlanId,
        orders: &[NewWorkOrder],
    ) -> Result<Vec<WorkOrder>, StoreError> {
        self.inner.insert_orders(plan_id, orders).await
    }

    async fn load_orders(&self, plan_id: PlanId) -> Result<Vec<WorkOrder>, StoreError> {
        self.inner.load_orders(plan_id).await
    }

    async fn load_order(&self, id: OrderId) -> Result<Option<WorkOrder>, StoreError> {
        self.inner.load_order(id).await
    }

    async fn update_order(&self, order: &WorkOrder) -> Result<(), StoreError> {
        if *self.refuse_order_updates.lock().unwrap() == Some(order.id) {
            return Err(StoreError::Backend("database is locked".to_string()));
        }
        self.inner.update_order(order).await
    }

    async fn insert_jobs(
        &self,
        order_id: OrderId,
        containers: &[ContainerId],
    ) -> Result<Vec<Job>, StoreError> {
        self.inner.insert_jobs(order_id, containers).await
    }

    async fn load_jobs(&self, order_id: OrderId) -> Result<Vec<Job>, StoreError> {
        self.inner.load_jobs(order_id).await
    }

    async fn load_job(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        self.inner.load_job(id).await
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        self.inner.update_job(job).await
    }
}

fn attributes(i: usize) -> Map<String, Value> {
    let value = json!({
        "gender": if i % 2 == 0 { "male" } else { "female" },
        "scientific_name": "Homo sapiens",
    });
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn project() -> ProjectRef {
    ProjectRef {
        id: 42,
        uuid: Uuid::new_v4(),
        name: "Cancer genomes".to_string(),
        cost_code: Some("S1234".to_string()),
    }
}

pub fn product() -> Product {
    Product {
        id: 7,
        uuid: Uuid::new_v4(),
        name: "Whole genome sequencing".to_string(),
        processes: vec![
            Process {
                id: 1,
                uuid: Uuid::new_v4(),
                name: "Library prep".to_string(),
                turnaround_days: 5,
                modules: vec![
                    ProcessModule { id: 10, name: "Quantification".to_string() },
                    ProcessModule { id: 11, name: "Library Prep".to_string() },
                ],
            },
            Process {
                id: 2,
                uuid: Uuid::new_v4(),
                name: "Sequencing".to_string(),
                turnaround_days: 10,
                modules: vec![
                    ProcessModule { id: 20, name: "HiSeq X".to_string() },
                    ProcessModule { id: 21, name: "Read Length".to_string() },
                ],
            },
        ],
    }
}

pub fn selections() -> Vec<Vec<ModuleSelection>> {
    vec![
        vec![ModuleSelection::new(10), ModuleSelection::new(11)],
        vec![ModuleSelection::new(20), ModuleSelection::with_value(21, 150)],
    ]
}

pub fn details() -> RequestDetails {
    RequestDetails {
        comment: Some("urgent batch".to_string()),
        desired_date: chrono::NaiveDate::from_ymd_opt(2026, 12, 1),
        priority: Priority::High,
    }
}
