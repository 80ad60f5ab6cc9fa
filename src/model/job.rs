use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::ids::{ContainerId, JobId, OrderId};
use super::status::JobStatus;
use crate::error::{Result, WorkOrderError};

/// One unit of dispatched work, bound to exactly one physical container.
///
/// The status is never stored: it is derived from the lifecycle timestamps,
/// which keeps `broken` orthogonal to the main queued/active/closed line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub uuid: Uuid,
    pub order_id: OrderId,
    pub container_id: ContainerId,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub broken_at: Option<DateTime<Utc>>,
    pub close_comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Events accepted by the job lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    Start,
    Complete { comment: Option<String> },
    Cancel { comment: Option<String> },
    Break,
    /// Manual resolution of a broken job
    Resolve { outcome: Resolution },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Completed,
    Cancelled,
}

impl JobEvent {
    pub fn verb(&self) -> &'static str {
        match self {
            JobEvent::Start => "start",
            JobEvent::Complete { .. } => "complete",
            JobEvent::Cancel { .. } => "cancel",
            JobEvent::Break => "break",
            JobEvent::Resolve { .. } => "resolve",
        }
    }
}

/// Audit record of one applied job event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTransitionRecord {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
    pub event: JobEvent,
    pub timestamp: DateTime<Utc>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        if self.completed_at.is_some() {
            JobStatus::Completed
        } else if self.cancelled_at.is_some() {
            JobStatus::Cancelled
        } else if self.broken_at.is_some() {
            JobStatus::Broken
        } else if self.started_at.is_some() {
            JobStatus::Active
        } else {
            JobStatus::Queued
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status().is_closed()
    }

    /// Apply an event, stamping the matching timestamp
    pub fn apply(&mut self, event: JobEvent, at: DateTime<Utc>) -> Result<JobTransitionRecord> {
        let from = self.status();

        match (from, &event) {
            (JobStatus::Queued, JobEvent::Start) => {
                self.started_at = Some(at);
            }
            (JobStatus::Active, JobEvent::Complete { comment }) => {
                self.completed_at = Some(at);
                self.close_comment = comment.clone();
            }
            (JobStatus::Active, JobEvent::Cancel { comment }) => {
                self.cancelled_at = Some(at);
                self.close_comment = comment.clone();
            }
            (JobStatus::Queued | JobStatus::Active, JobEvent::Break) => {
                self.broken_at = Some(at);
            }
            (JobStatus::Broken, JobEvent::Resolve { outcome }) => match outcome {
                Resolution::Completed => self.completed_at = Some(at),
                Resolution::Cancelled => self.cancelled_at = Some(at),
            },
            _ => {
                return Err(WorkOrderError::InvalidTransition {
                    entity: "job",
                    from: from.to_string(),
                    event: event.verb().to_string(),
                })
            }
        }

        let record = JobTransitionRecord {
            job_id: self.id,
            from,
            to: self.status(),
            event,
            timestamp: at,
        };

        info!(
            job_id = %record.job_id,
            from = %record.from,
            to = %record.to,
            event = ?record.event,
            "Job state transition"
        );

        Ok(record)
    }
}
