//! Sample-set registry abstraction
//!
//! The registry stores named, uuid-identified sample collections. This crate
//! never implements the storage itself; it only locks and clones sets through
//! this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::ServiceError;
use crate::model::{MaterialId, SetId};

/// A sample collection as reported by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleSet {
    pub id: SetId,
    pub name: String,
    pub locked: bool,
    /// Number of members
    pub size: u64,
}

/// One page of set members
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembersPage {
    pub ids: Vec<MaterialId>,
    pub next_cursor: Option<String>,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SampleSetRegistry: Send + Sync {
    /// Fetch a set; `ServiceError::NotFound` when the registry has no such set
    async fn fetch(&self, id: &SetId) -> Result<SampleSet, ServiceError>;

    /// Lock a set in place. Not idempotent from the caller's point of view:
    /// always re-fetch to verify.
    async fn lock(&self, id: &SetId) -> Result<SampleSet, ServiceError>;

    async fn clone_locked(&self, source: &SetId, name: &str) -> Result<SampleSet, ServiceError>;

    async fn clone_unlocked(&self, source: &SetId, name: &str) -> Result<SampleSet, ServiceError>;

    /// Members of a set, one page at a time; `None` cursor starts from the beginning
    async fn members_page(
        &self,
        id: &SetId,
        cursor: Option<String>,
    ) -> Result<MembersPage, ServiceError>;
}

/// Walk every page of a set's members, in registry order.
///
/// Any page failure aborts the whole enumeration; pages are not retried.
pub async fn all_members(
    registry: &dyn SampleSetRegistry,
    id: &SetId,
) -> Result<Vec<MaterialId>, ServiceError> {
    let mut members = Vec::new();
    let mut cursor = None;
    loop {
        let page = registry.members_page(id, cursor).await?;
        members.extend(page.ids);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(members)
}
