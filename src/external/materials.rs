//! Material catalog abstraction: resolves sample ids to their records and to
//! the containers holding them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::ServiceError;
use crate::model::{ContainerId, MaterialId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    /// False once the material has been consumed by another process
    pub available: bool,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub address: String,
    pub material_id: Option<MaterialId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub barcode: String,
    pub num_of_rows: u32,
    pub num_of_cols: u32,
    pub slots: Vec<Slot>,
}

impl Container {
    /// Whether any slot holds one of the given materials
    pub fn holds_any(&self, ids: &std::collections::HashSet<MaterialId>) -> bool {
        self.slots
            .iter()
            .filter_map(|s| s.material_id.as_ref())
            .any(|m| ids.contains(m))
    }
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait MaterialCatalog: Send + Sync {
    async fn resolve_materials(&self, ids: &[MaterialId]) -> Result<Vec<Material>, ServiceError>;

    /// Every container with at least one slot holding one of `ids`
    async fn resolve_containers_containing(
        &self,
        ids: &[MaterialId],
    ) -> Result<Vec<Container>, ServiceError>;
}
