//! Best-effort lifecycle notifications
//!
//! Every call returns a [`NotifyOutcome`] that callers are free to ignore.
//! Nothing in here can fail the operation that triggered it.

use chrono::{NaiveDate, Utc};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::SampleSetCache;
use crate::config::EventsConfig;
use crate::external::{BillingNotice, EventMessage, EventRole, EventSink};
use crate::model::{OrderStatus, SetId, WorkOrder, WorkPlan};
use crate::observability::DispatchMetrics;

/// Status label of the activation event
const SUBMITTED: &str = "submitted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    Delivered,
    /// The order was not in a state this event describes
    Skipped(&'static str),
    Failed(String),
}

impl NotifyOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, NotifyOutcome::Delivered)
    }
}

#[derive(Clone)]
pub struct Notifier {
    sink: Arc<dyn EventSink>,
    sets: SampleSetCache,
    config: EventsConfig,
    metrics: Arc<DispatchMetrics>,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    pub fn new(
        sink: Arc<dyn EventSink>,
        sets: SampleSetCache,
        config: EventsConfig,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        Self {
            sink,
            sets,
            config,
            metrics,
        }
    }

    /// Order created and waiting in its plan's sequence
    pub async fn order_queued(&self, plan: &WorkPlan, order: &WorkOrder) -> NotifyOutcome {
        if !order.is_queued() {
            return self.skip(order, "order is not queued");
        }
        let mut metadata = Map::new();
        metadata.insert("work_order_id".to_string(), json!(order.id.0));
        self.deliver(plan, order, OrderStatus::Queued.as_str(), metadata).await
    }

    /// Order dispatched: carries the input size and requested completion date
    pub async fn order_submitted(&self, plan: &WorkPlan, order: &WorkOrder) -> NotifyOutcome {
        if !order.is_active() {
            return self.skip(order, "order is not active");
        }
        let mut metadata = Map::new();
        metadata.insert("work_order_id".to_string(), json!(order.id.0));
        metadata.insert("comment".to_string(), json!(plan.comment));
        metadata.insert(
            "desired_completion_date".to_string(),
            date_value(plan.desired_date),
        );
        metadata.insert(
            "estimated_completion_date".to_string(),
            date_value(order.estimated_completion_date()),
        );
        metadata.insert(
            "num_materials".to_string(),
            json!(self.set_size(order.set_id).await),
        );
        self.deliver(plan, order, SUBMITTED, metadata).await
    }

    /// Order closed: carries the close comment and the output size
    pub async fn order_closed(&self, plan: &WorkPlan, order: &WorkOrder) -> NotifyOutcome {
        if !order.is_closed() {
            return self.skip(order, "order is not closed");
        }
        let mut metadata = Map::new();
        metadata.insert("work_order_id".to_string(), json!(order.id.0));
        metadata.insert("comment".to_string(), json!(order.close_comment));
        metadata.insert(
            "num_new_materials".to_string(),
            json!(self.set_size(order.finished_set_id).await),
        );
        self.deliver(plan, order, order.status.as_str(), metadata).await
    }

    fn skip(&self, order: &WorkOrder, reason: &'static str) -> NotifyOutcome {
        warn!(order_id = %order.id, status = %order.status, "Skipping lifecycle event: {}", reason);
        NotifyOutcome::Skipped(reason)
    }

    async fn set_size(&self, id: Option<SetId>) -> u64 {
        let Some(id) = id else { return 0 };
        match self.sets.get(&id).await {
            Ok(Some(set)) => set.size,
            Ok(None) => 0,
            Err(e) => {
                warn!(set_id = %id, error = %e, "Could not read set size for event");
                0
            }
        }
    }

    fn message(
        &self,
        plan: &WorkPlan,
        order: &WorkOrder,
        status: &str,
        metadata: Map<String, Value>,
    ) -> EventMessage {
        let mut roles = vec![EventRole {
            role_type: "work_order".to_string(),
            subject_type: "work_order".to_string(),
            subject_friendly_name: order.name(),
            subject_uuid: order.uuid,
        }];
        if let Some(project) = &plan.project {
            roles.push(EventRole {
                role_type: "project".to_string(),
                subject_type: "project".to_string(),
                subject_friendly_name: project.name.clone(),
                subject_uuid: project.uuid,
            });
        }
        if let Some(product) = &plan.product {
            roles.push(EventRole {
                role_type: "product".to_string(),
                subject_type: "product".to_string(),
                subject_friendly_name: product.name.clone(),
                subject_uuid: product.uuid,
            });
        }

        EventMessage {
            event_type: format!("{}.{}", self.config.event_type_prefix, status),
            lims_id: self.config.lims_id.clone(),
            uuid: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_identifier: plan.owner_email.clone(),
            status: status.to_string(),
            roles,
            metadata,
        }
    }

    async fn deliver(
        &self,
        plan: &WorkPlan,
        order: &WorkOrder,
        status: &str,
        metadata: Map<String, Value>,
    ) -> NotifyOutcome {
        let message = self.message(plan, order, status, metadata);
        let notice = BillingNotice {
            work_order_uuid: order.uuid,
            status: status.to_string(),
        };

        let mut failures = Vec::new();
        if let Err(e) = self.sink.publish(&message).await {
            failures.push(format!("publish: {e}"));
        }
        if let Err(e) = self.sink.notify_billing(&notice).await {
            failures.push(format!("billing: {e}"));
        }

        if failures.is_empty() {
            info!(order_id = %order.id, event_type = %message.event_type, "Lifecycle event delivered");
            NotifyOutcome::Delivered
        } else {
            let reason = failures.join("; ");
            self.metrics.record_notification_failure();
            warn!(order_id = %order.id, event_type = %message.event_type, "Lifecycle event not delivered: {}", reason);
            NotifyOutcome::Failed(reason)
        }
    }
}

fn date_value(date: Option<NaiveDate>) -> Value {
    date.map(|d| json!(d.format("%Y-%m-%d").to_string()))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::external::events::MockEventSink;
    use crate::external::memory::InMemorySetRegistry;
    use crate::external::ServiceError;
    use crate::model::{OrderId, PlanId, Process};
    use crate::priority::Priority;

    fn plan() -> WorkPlan {
        let now = Utc::now();
        WorkPlan {
            id: PlanId(1),
            uuid: Uuid::new_v4(),
            owner_email: "owner@example.com".to_string(),
            product: None,
            project: None,
            original_set_id: None,
            comment: Some("rush".to_string()),
            desired_date: NaiveDate::from_ymd_opt(2026, 11, 2),
            priority: Priority::High,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn order(status: OrderStatus) -> WorkOrder {
        let now = Utc::now();
        WorkOrder {
            id: OrderId(7),
            uuid: Uuid::new_v4(),
            plan_id: PlanId(1),
            order_index: 0,
            process: Process {
                id: 1,
                uuid: Uuid::new_v4(),
                name: "Extraction".to_string(),
                turnaround_days: 2,
                modules: vec![],
            },
            module_choices: vec![],
            original_set_id: None,
            set_id: None,
            finished_set_id: None,
            status,
            dispatch_date: Some(now),
            close_comment: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn notifier(sink: MockEventSink, registry: Arc<InMemorySetRegistry>) -> Notifier {
        let metrics = Arc::new(DispatchMetrics::new());
        let sets = SampleSetCache::new(registry, &CacheConfig::default(), metrics.clone());
        Notifier::new(Arc::new(sink), sets, EventsConfig::default(), metrics)
    }

    #[tokio::test]
    async fn test_submitted_event_carries_input_size() {
        let registry = Arc::new(InMemorySetRegistry::default());
        let set_id = registry.add_set("input", vec!["m1".into(), "m2".into()], true);

        let mut sink = MockEventSink::new();
        sink.expect_publish()
            .withf(|m| {
                m.event_type == "aker.events.work_order.submitted"
                    && m.metadata["num_materials"] == json!(2)
                    && m.metadata["desired_completion_date"] == json!("2026-11-02")
                    && m.user_identifier == "owner@example.com"
            })
            .times(1)
            .returning(|_| Ok(()));
        sink.expect_notify_billing().times(1).returning(|_| Ok(()));

        let mut active = order(OrderStatus::Active);
        active.set_id = Some(set_id);
        let outcome = notifier(sink, registry).order_submitted(&plan(), &active).await;
        assert_eq!(outcome, NotifyOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_wrong_state_is_skipped_without_sending() {
        let sink = MockEventSink::new();
        let outcome = notifier(sink, Arc::new(InMemorySetRegistry::default()))
            .order_closed(&plan(), &order(OrderStatus::Active))
            .await;
        assert!(matches!(outcome, NotifyOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_sink_failure_is_reported_not_raised() {
        let mut sink = MockEventSink::new();
        sink.expect_publish().returning(|_| {
            Err(ServiceError::Unavailable {
                service: "event broker",
                message: "connection refused".to_string(),
            })
        });
        sink.expect_notify_billing().returning(|_| Ok(()));

        let outcome = notifier(sink, Arc::new(InMemorySetRegistry::default()))
            .order_queued(&plan(), &order(OrderStatus::Queued))
            .await;
        assert!(matches!(outcome, NotifyOutcome::Failed(reason) if reason.contains("connection refused")));
    }
}
