use chrono::Utc;
use tracing::{debug, error, info};

use super::WorkOrderService;
use crate::error::{Result, WorkOrderError};
use crate::external::SampleSet;
use crate::model::{OrderId, WorkOrder};

impl WorkOrderService {
    /// Make sure the order has a locked input set.
    ///
    /// Returns true when a registry lock or clone was performed by this call.
    /// Running it again once the input set is locked is a no-op that issues
    /// no registry mutation.
    pub async fn finalise_set(&self, order_id: OrderId) -> Result<bool> {
        let _guard = self.lock_order(order_id).await;
        let mut order = self.load_order(order_id).await?;
        self.finalise_order_set(&mut order).await
    }

    /// Caller must hold the order's lock
    pub(super) async fn finalise_order_set(&self, order: &mut WorkOrder) -> Result<bool> {
        let registry = self.sets.registry();

        if let Some(set_id) = order.set_id {
            let current = self.sets.fetch_fresh(&set_id).await?;
            if current.locked {
                debug!(order_id = %order.id, set_id = %set_id, "Input set already locked");
                return Ok(false);
            }

            info!(order_id = %order.id, set_id = %set_id, "Locking input set in place");
            registry.lock(&set_id).await?;
            let verified = self.sets.fetch_fresh(&set_id).await?;
            if !verified.locked {
                error!(order_id = %order.id, set_id = %set_id, "Lock request was not observed by the registry");
                return Err(WorkOrderError::Consistency(format!(
                    "failed to lock set {} for {}",
                    verified.name,
                    order.name()
                )));
            }
            return Ok(true);
        }

        let original_id = order.original_set_id.ok_or_else(|| {
            WorkOrderError::Configuration(format!("no set selected for {}", order.name()))
        })?;
        let original = self.sets.fetch_fresh(&original_id).await?;

        let (adopted, newly_locked): (SampleSet, bool) = if original.locked {
            debug!(order_id = %order.id, set_id = %original_id, "Adopting locked original set");
            (original, false)
        } else {
            info!(order_id = %order.id, set_id = %original_id, "Creating locked clone of original set");
            let clone = registry.clone_locked(&original_id, &order.name()).await?;
            if !clone.locked {
                return Err(WorkOrderError::Consistency(format!(
                    "clone {} of set {} came back unlocked",
                    clone.id, original_id
                )));
            }
            self.sets.store(&clone).await;
            (clone, true)
        };

        order.set_id = Some(adopted.id);
        order.updated_at = Utc::now();
        self.store.update_order(order).await?;
        info!(order_id = %order.id, set_id = %adopted.id, newly_locked, "Input set assigned");
        Ok(newly_locked)
    }

    /// Give the order an editable (unlocked) copy of its original set as its input set
    pub async fn create_editable_set(&self, order_id: OrderId) -> Result<SampleSet> {
        let _guard = self.lock_order(order_id).await;
        let mut order = self.load_order(order_id).await?;

        if order.set_id.is_some() {
            return Err(WorkOrderError::Configuration(format!(
                "{} already has an input set",
                order.name()
            )));
        }
        let original_id = order.original_set_id.ok_or_else(|| {
            WorkOrderError::Configuration(format!("{} has no original set", order.name()))
        })?;

        let set = self
            .sets
            .registry()
            .clone_unlocked(&original_id, &order.name())
            .await?;
        self.sets.store(&set).await;

        order.set_id = Some(set.id);
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;
        info!(order_id = %order.id, set_id = %set.id, "Created editable input set");
        Ok(set)
    }
}
