use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use super::WorkOrderService;
use crate::error::{Result, WorkOrderError};
use crate::external::{
    all_members, normalise_module_name, Container, ContainerPayload, JobPayload, Material,
    MaterialPayload, ServiceError,
};
use crate::model::{ContainerId, Job, MaterialId, SetId, WorkOrder, WorkPlan};

/// The containers a dispatch will create jobs for, with the materials
/// resolved for the order's locked set
#[derive(Debug, Clone)]
pub struct JobPlan {
    pub containers: Vec<Container>,
    pub materials: HashMap<MaterialId, Material>,
}

impl JobPlan {
    pub fn container_ids(&self) -> Vec<ContainerId> {
        self.containers.iter().map(|c| c.id.clone()).collect()
    }

    pub fn container(&self, id: &ContainerId) -> Option<&Container> {
        self.containers.iter().find(|c| &c.id == id)
    }
}

/// Distinct containers holding any of `members`, in first-seen order.
///
/// A container is kept whole even when only some of its slots belong to the
/// set. Fails when a member sits in none of the containers.
pub fn group_by_container(
    members: &[MaterialId],
    containers: Vec<Container>,
) -> std::result::Result<Vec<Container>, Vec<MaterialId>> {
    let wanted: HashSet<&MaterialId> = members.iter().collect();
    let mut seen = HashSet::new();
    let mut covered = HashSet::new();
    let mut distinct = Vec::new();

    for container in containers {
        let held: Vec<&MaterialId> = container
            .slots
            .iter()
            .filter_map(|s| s.material_id.as_ref())
            .filter(|m| wanted.contains(m))
            .collect();
        if held.is_empty() || !seen.insert(container.id.clone()) {
            continue;
        }
        covered.extend(held.into_iter().cloned());
        distinct.push(container);
    }

    let missing: Vec<MaterialId> = members
        .iter()
        .filter(|m| !covered.contains(*m))
        .cloned()
        .collect();
    if missing.is_empty() {
        Ok(distinct)
    } else {
        Err(missing)
    }
}

fn id_list(ids: &[MaterialId]) -> String {
    ids.iter().map(|m| m.0.as_str()).collect::<Vec<_>>().join(", ")
}

impl WorkOrderService {
    /// Check every chosen module name with the billing authority
    pub(super) async fn validate_modules(&self, order: &WorkOrder) -> Result<()> {
        let mut bad = Vec::new();
        for name in order.module_names() {
            let normalised = normalise_module_name(&name);
            if !self
                .collaborators
                .validator
                .is_valid_module_name(&normalised)
                .await?
            {
                bad.push(name);
            }
        }

        if !bad.is_empty() {
            return Err(WorkOrderError::Validation(format!(
                "process module could not be validated: {}",
                bad.join(", ")
            )));
        }
        Ok(())
    }

    /// Resolve the locked set into the containers to create jobs for
    pub(super) async fn plan_jobs(&self, set_id: &SetId) -> Result<JobPlan> {
        let members = all_members(self.sets.registry(), set_id).await?;
        if members.is_empty() {
            return Err(WorkOrderError::Precondition(format!(
                "set {set_id} has no materials"
            )));
        }
        debug!(set_id = %set_id, members = members.len(), "Enumerated set members");

        let catalog = &self.collaborators.catalog;
        let materials: HashMap<MaterialId, Material> = catalog
            .resolve_materials(&members)
            .await?
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let unresolved: Vec<MaterialId> = members
            .iter()
            .filter(|m| !materials.contains_key(*m))
            .cloned()
            .collect();
        if !unresolved.is_empty() {
            return Err(ServiceError::UnexpectedResponse {
                service: "material catalog",
                message: format!("materials not found: {}", id_list(&unresolved)),
            }
            .into());
        }

        let mut unavailable: Vec<MaterialId> = materials
            .values()
            .filter(|m| !m.available)
            .map(|m| m.id.clone())
            .collect();
        if !unavailable.is_empty() {
            unavailable.sort();
            return Err(WorkOrderError::Precondition(format!(
                "some of the specified materials are not available: {}",
                id_list(&unavailable)
            )));
        }

        let containers = catalog.resolve_containers_containing(&members).await?;
        let containers = group_by_container(&members, containers).map_err(|missing| {
            WorkOrderError::Precondition(format!(
                "materials are not in any container: {}",
                id_list(&missing)
            ))
        })?;

        info!(set_id = %set_id, containers = containers.len(), "Partitioned set into containers");
        Ok(JobPlan {
            containers,
            materials,
        })
    }
}

/// Build the execution-system payload for one job. Only the container's
/// slots holding materials of the order's set are listed.
pub(super) fn build_payload(
    plan: &WorkPlan,
    order: &WorkOrder,
    job: &Job,
    container: &Container,
    job_plan: &JobPlan,
) -> JobPayload {
    let materials = container
        .slots
        .iter()
        .filter_map(|slot| {
            let id = slot.material_id.as_ref()?;
            let material = job_plan.materials.get(id)?;
            Some(MaterialPayload {
                id: id.clone(),
                address: slot.address.clone(),
                attributes: material.attributes.clone(),
            })
        })
        .collect();

    JobPayload {
        job_id: job.id,
        job_uuid: job.uuid,
        work_order_id: order.id,
        process_name: order.process.name.clone(),
        process_uuid: order.process.uuid,
        modules: order.module_names(),
        materials,
        container: ContainerPayload {
            container_id: container.id.clone(),
            barcode: container.barcode.clone(),
            num_of_rows: container.num_of_rows,
            num_of_cols: container.num_of_cols,
        },
        project_uuid: plan.project.as_ref().map(|p| p.uuid),
        project_name: plan.project.as_ref().map(|p| p.name.clone()),
        cost_code: plan.project.as_ref().and_then(|p| p.cost_code.clone()),
        comment: plan.comment.clone(),
        desired_date: plan.desired_date,
        priority: plan.priority,
    }
}
