use chrono::Utc;
use tracing::{info, warn};

use super::WorkOrderService;
use crate::error::{Result, WorkOrderError};
use crate::model::{OrderId, SetId, WorkOrder};

impl WorkOrderService {
    /// Record the output set an order produced. Once the order is closed the
    /// output becomes the next order's original set.
    pub async fn assign_finished_set(&self, order_id: OrderId, set_id: SetId) -> Result<WorkOrder> {
        let _guard = self.lock_order(order_id).await;
        let mut order = self.load_order(order_id).await?;

        if order.is_queued() {
            return Err(WorkOrderError::Precondition(format!(
                "{} has not been dispatched",
                order.name()
            )));
        }
        match order.finished_set_id {
            // Repeating the assignment retries a hand-off that failed at closure
            Some(existing) if existing == set_id => {
                if order.is_closed() {
                    self.hand_off_output(&order).await?;
                }
                return Ok(order);
            }
            Some(existing) => {
                return Err(WorkOrderError::Precondition(format!(
                    "{} already has finished set {existing}",
                    order.name()
                )))
            }
            None => {}
        }

        order.finished_set_id = Some(set_id);
        order.updated_at = Utc::now();
        self.store.update_order(&order).await?;
        self.sets.invalidate_order(&order).await;
        info!(order_id = %order_id, set_id = %set_id, "Finished set assigned");

        if order.is_closed() {
            self.hand_off_output(&order).await?;
        }
        Ok(order)
    }

    /// Operator marker for an order that cannot proceed
    pub async fn mark_order_broken(&self, order_id: OrderId) -> Result<WorkOrder> {
        let _guard = self.lock_order(order_id).await;
        let mut order = self.load_order(order_id).await?;
        order.mark_broken(Utc::now())?;
        self.store.update_order(&order).await?;
        self.sets.invalidate_order(&order).await;
        warn!(order_id = %order_id, "Work order marked broken");
        Ok(order)
    }

    /// Size of the order's input set, if it has one the registry knows
    pub async fn num_samples(&self, order_id: OrderId) -> Result<Option<u64>> {
        let order = self.load_order(order_id).await?;
        let Some(set_id) = order.set_id else {
            return Ok(None);
        };
        Ok(self.sets.get(&set_id).await?.map(|s| s.size))
    }

    /// Pass a closed order's output set to the next order, unless that order
    /// already has an original set
    pub(super) async fn hand_off_output(&self, order: &WorkOrder) -> Result<()> {
        let Some(finished) = order.finished_set_id else {
            return Ok(());
        };
        let Some(next_id) = self
            .store
            .load_orders(order.plan_id)
            .await?
            .into_iter()
            .find(|o| o.order_index == order.order_index + 1)
            .map(|o| o.id)
        else {
            return Ok(());
        };

        let _guard = self.lock_order(next_id).await;
        let mut next = self.load_order(next_id).await?;
        if next.original_set_id.is_some() {
            return Ok(());
        }
        next.original_set_id = Some(finished);
        next.updated_at = Utc::now();
        self.store.update_order(&next).await?;
        info!(order_id = %order.id, next_order_id = %next.id, set_id = %finished, "Output set handed to next order");
        Ok(())
    }
}
