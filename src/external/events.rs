//! Event sink: lifecycle events for the message broker and billing notifications

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::ServiceError;

/// Structured lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub event_type: String,
    pub lims_id: String,
    pub uuid: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_identifier: String,
    pub status: String,
    pub roles: Vec<EventRole>,
    pub metadata: Map<String, Value>,
}

impl EventMessage {
    /// Uuids of every subject the event is about
    pub fn subject_ids(&self) -> Vec<Uuid> {
        self.roles.iter().map(|r| r.subject_uuid).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRole {
    pub role_type: String,
    pub subject_type: String,
    pub subject_friendly_name: String,
    pub subject_uuid: Uuid,
}

/// Billing-side notification that an order changed status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingNotice {
    pub work_order_uuid: Uuid,
    pub status: String,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, message: &EventMessage) -> Result<(), ServiceError>;

    async fn notify_billing(&self, notice: &BillingNotice) -> Result<(), ServiceError>;
}

/// Sink that writes events to the structured log; used when no broker is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, message: &EventMessage) -> Result<(), ServiceError> {
        let body = serde_json::to_string(message).map_err(|e| ServiceError::UnexpectedResponse {
            service: "event log",
            message: e.to_string(),
        })?;
        info!(event_type = %message.event_type, event = %body, "Lifecycle event");
        Ok(())
    }

    async fn notify_billing(&self, notice: &BillingNotice) -> Result<(), ServiceError> {
        info!(
            work_order_uuid = %notice.work_order_uuid,
            status = %notice.status,
            "Billing notification"
        );
        Ok(())
    }
}
