use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use super::Command;
use crate::config::{config, WorkOrdersConfig};
use crate::external::memory::{
    InMemoryMaterialCatalog, InMemorySetRegistry, RecordingEventSink, RecordingGateway,
    StaticModuleValidator,
};
use crate::external::{
    Collaborators, Container, HttpExecutionGateway, HttpModuleValidator, LogEventSink,
    SampleSetRegistry,
};
use crate::model::{MaterialId, ModuleSelection, OrderId, Product, ProjectRef, SetId};
use crate::orchestration::{RequestDetails, WorkOrderService};
use crate::store::{MemoryWorkStore, WorkStore};

/// A self-contained plan run: the catalog data, the starting set and the
/// choices a user would make
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub owner: String,
    pub project: ProjectRef,
    pub product: Product,
    #[serde(default)]
    pub details: RequestDetails,
    /// One list of module selections per process
    pub module_selections: Vec<Vec<ModuleSelection>>,
    /// Module names the billing authority accepts
    pub valid_modules: Vec<String>,
    pub original_set: ScenarioSet,
    pub materials: Vec<ScenarioMaterial>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSet {
    pub name: String,
    #[serde(default)]
    pub locked: bool,
    pub members: Vec<MaterialId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioMaterial {
    pub id: String,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

fn default_available() -> bool {
    true
}

impl Scenario {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading scenario {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))
    }
}

pub struct SimulateCommand {
    pub scenario: PathBuf,
    pub dispatch: Vec<usize>,
    pub complete_jobs: bool,
    pub persist: bool,
    pub live_services: bool,
}

#[cfg(feature = "database")]
async fn persistent_store(config: &WorkOrdersConfig) -> Result<Arc<dyn WorkStore>> {
    let db = config
        .database
        .as_ref()
        .context("--persist needs a [database] section in the configuration")?;
    let store = crate::store::SqliteWorkStore::connect(db).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "database"))]
async fn persistent_store(_config: &WorkOrdersConfig) -> Result<Arc<dyn WorkStore>> {
    anyhow::bail!("--persist needs a build with the database feature")
}

/// Handles on the in-process collaborators, kept for the final summary
struct Doubles {
    registry: Arc<InMemorySetRegistry>,
    events: Option<Arc<RecordingEventSink>>,
    gateway: Option<Arc<RecordingGateway>>,
}

impl SimulateCommand {
    async fn open_store(&self, config: &WorkOrdersConfig) -> Result<Arc<dyn WorkStore>> {
        if self.persist {
            persistent_store(config).await
        } else {
            Ok(Arc::new(MemoryWorkStore::new()))
        }
    }

    /// Sets and materials always come from the scenario. With live services
    /// the configured LIMS and billing endpoints receive the jobs and module
    /// checks, and events go to the log.
    fn collaborators(
        &self,
        scenario: &Scenario,
        config: &WorkOrdersConfig,
    ) -> Result<(Collaborators, Doubles, SetId)> {
        let registry = Arc::new(InMemorySetRegistry::default());
        let original = registry.add_set(
            &scenario.original_set.name,
            scenario.original_set.members.clone(),
            scenario.original_set.locked,
        );

        let catalog = Arc::new(InMemoryMaterialCatalog::new());
        for material in &scenario.materials {
            catalog.add_material(&material.id, material.available, material.attributes.clone());
        }
        for container in &scenario.containers {
            catalog.add_container(container.clone());
        }

        if self.live_services {
            let timeout = config.services.request_timeout();
            info!(lims_url = %config.services.lims_url, billing_url = %config.services.billing_url, "Using live services");
            let collaborators = Collaborators {
                registry: registry.clone(),
                catalog,
                validator: Arc::new(HttpModuleValidator::new(&config.services.billing_url, timeout)?),
                events: Arc::new(LogEventSink),
                gateway: Arc::new(HttpExecutionGateway::new(&config.services.lims_url, timeout)?),
            };
            let doubles = Doubles {
                registry,
                events: None,
                gateway: None,
            };
            return Ok((collaborators, doubles, original));
        }

        let events = Arc::new(RecordingEventSink::new());
        let gateway = Arc::new(RecordingGateway::new());
        let collaborators = Collaborators {
            registry: registry.clone(),
            catalog,
            validator: Arc::new(StaticModuleValidator::new(&scenario.valid_modules)),
            events: events.clone(),
            gateway: gateway.clone(),
        };
        let doubles = Doubles {
            registry,
            events: Some(events),
            gateway: Some(gateway),
        };
        Ok((collaborators, doubles, original))
    }

    async fn complete_order(
        service: &WorkOrderService,
        doubles: &Doubles,
        order_id: OrderId,
    ) -> Result<()> {
        for job in service.load_jobs(order_id).await? {
            service.start_job(job.id).await?;
            let report = service
                .complete_job(job.id, Some("completed by simulator".to_string()))
                .await?;
            println!(
                "   ✅ Job {} ({}) completed, order is {}",
                job.id, job.container_id, report.order_status
            );
        }

        // The output of a finished stage is a new set with the same members
        let order = service.load_order(order_id).await?;
        if let Some(input) = order.set_id {
            let output = doubles
                .registry
                .clone_unlocked(&input, &format!("{} output", order.name()))
                .await?;
            service.assign_finished_set(order_id, output.id).await?;
            println!("   📦 Output set {} assigned", output.id);
        }
        Ok(())
    }
}

impl Command for SimulateCommand {
    async fn execute(&self) -> Result<()> {
        let config = config()?;
        let scenario = Scenario::from_file(&self.scenario)?;
        let store = self.open_store(config).await?;
        let (collaborators, doubles, original) = self.collaborators(&scenario, config)?;
        let service = WorkOrderService::new(collaborators, store, config);

        println!("🧪 Running scenario {}", self.scenario.display());
        let plan = service.create_plan(&scenario.owner).await?;
        service.select_original_set(plan.id, original).await?;
        service.select_project(plan.id, scenario.project.clone()).await?;
        service.select_product(plan.id, scenario.product.clone()).await?;
        service
            .set_request_details(plan.id, scenario.details.clone())
            .await?;
        let orders = service
            .create_orders(plan.id, &scenario.module_selections, None)
            .await?;
        println!("📋 {} created with {} work order(s)", plan.name(), orders.len());

        let indexes: Vec<usize> = if self.dispatch.is_empty() {
            (0..orders.len()).collect()
        } else {
            self.dispatch.clone()
        };

        for index in indexes {
            let Some(order) = orders.iter().find(|o| o.order_index == index) else {
                println!("⚠️  Plan has no order at index {index}");
                continue;
            };

            println!();
            println!("🚀 Dispatching {} ({})", order.name(), order.process.name);
            match service.dispatch(order.id).await {
                Ok(report) => {
                    println!(
                        "   {} job(s) created, order is {}{}",
                        report.jobs.len(),
                        report.status,
                        if report.newly_locked { ", input set locked" } else { "" }
                    );
                    if self.complete_jobs {
                        Self::complete_order(&service, &doubles, order.id).await?;
                    }
                }
                Err(e) => {
                    println!("   ❌ {e}");
                    if e.is_retryable() {
                        println!("   💡 The dispatch can be retried once the service recovers");
                    }
                }
            }
        }

        let overview = service.plan_overview(plan.id).await?;
        println!();
        println!("📊 {} is {}", overview.plan.name(), overview.status);
        if !overview.summary.is_empty() {
            println!("   {}", overview.summary);
        }
        for order in &overview.orders {
            println!("   #{} {:<24} {}", order.order_index, order.process.name, order.status);
        }
        if let (Some(gateway), Some(events)) = (&doubles.gateway, &doubles.events) {
            println!(
                "   {} job(s) sent to LIMS, {} event(s) published",
                gateway.submitted().len(),
                events.events().len()
            );
        }

        info!(plan_id = %plan.id, status = %overview.status, "Simulation finished");
        service.metrics().log_stats();
        Ok(())
    }
}
