// Product and project references a plan is built from. The catalog that
// defines them is edited elsewhere; plans only hold snapshots.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product: a fixed sequence of processes, one work order per process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub processes: Vec<Process>,
}

/// One processing stage of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    /// Turnaround time in days
    pub turnaround_days: u32,
    pub modules: Vec<ProcessModule>,
}

impl Process {
    pub fn module(&self, module_id: i64) -> Option<&ProcessModule> {
        self.modules.iter().find(|m| m.id == module_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessModule {
    pub id: i64,
    pub name: String,
}

/// Reference to the project (cost-coded study node) a plan is billed against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: i64,
    pub uuid: Uuid,
    pub name: String,
    pub cost_code: Option<String>,
}

/// A module chosen for one process, as submitted when orders are created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSelection {
    pub module_id: i64,
    /// Parameter value for modules that take one
    #[serde(default)]
    pub selected_value: Option<i64>,
}

impl ModuleSelection {
    pub fn new(module_id: i64) -> Self {
        Self {
            module_id,
            selected_value: None,
        }
    }

    pub fn with_value(module_id: i64, value: i64) -> Self {
        Self {
            module_id,
            selected_value: Some(value),
        }
    }
}
