//! Process-module validation against the billing authority

use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::ServiceError;

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait ModuleValidator: Send + Sync {
    /// `name` is already normalised with [`normalise_module_name`]
    async fn is_valid_module_name(&self, name: &str) -> Result<bool, ServiceError>;
}

/// Module names are looked up in URI form: spaces become underscores, lower case
pub fn normalise_module_name(name: &str) -> String {
    name.replace(' ', "_").to_lowercase()
}
