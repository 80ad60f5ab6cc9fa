use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure for the work-order service
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkOrdersConfig {
    /// Remote service endpoints
    pub services: ServicesConfig,
    /// Sample-set read cache
    pub cache: CacheConfig,
    /// Lifecycle event settings
    pub events: EventsConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServicesConfig {
    /// Base URL of the execution system (LIMS)
    pub lims_url: String,
    /// Base URL of the billing service used for module-name validation
    pub billing_url: String,
    pub request_timeout_seconds: u64,
}

impl ServicesConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub set_ttl_seconds: u64,
    pub max_capacity: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Prefix of every event type, e.g. "aker.events.work_order"
    pub event_type_prefix: String,
    /// Identifier of this system in emitted events
    pub lims_id: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON log lines instead of human-readable ones
    pub json_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            lims_url: "http://localhost:3000/api/v1".to_string(),
            billing_url: "http://localhost:3601".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            set_ttl_seconds: 300, // 5 minutes
            max_capacity: 1_000,
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            event_type_prefix: "aker.events.work_order".to_string(),
            lims_id: "aker".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
        }
    }
}

impl Default for WorkOrdersConfig {
    fn default() -> Self {
        Self {
            services: ServicesConfig::default(),
            cache: CacheConfig::default(),
            events: EventsConfig::default(),
            observability: ObservabilityConfig::default(),
            database: Some(DatabaseConfig {
                url: "sqlite://.work-orders/work-orders.db".to_string(),
                max_connections: 10,
                auto_migrate: true,
            }),
        }
    }
}

impl WorkOrdersConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (work-orders.toml, .work-orders-rc)
    /// 3. Environment variables (prefixed with WORK_ORDERS_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("work-orders.toml").exists() {
            builder = builder.add_source(File::with_name("work-orders"));
        }

        if Path::new(".work-orders-rc").exists() {
            builder = builder.add_source(
                File::with_name(".work-orders-rc").format(config::FileFormat::Toml),
            );
        }

        // WORK_ORDERS_SERVICES__LIMS_URL -> services.lims_url
        builder = builder.add_source(
            Environment::with_prefix("WORK_ORDERS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let work_orders_config: WorkOrdersConfig = config.try_deserialize()?;
        Ok(work_orders_config)
    }

    /// Load from one explicit file, still honouring environment overrides
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).format(config::FileFormat::Toml))
            .add_source(
                Environment::with_prefix("WORK_ORDERS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<WorkOrdersConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        let _ = WorkOrdersConfig::load_env_file();
        WorkOrdersConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static WorkOrdersConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}

/// Initialize configuration (called at startup)
pub fn init_config() -> Result<()> {
    let _config = config()?;
    tracing::info!("Configuration loaded successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_usable() {
        let config = WorkOrdersConfig::default();
        assert_eq!(config.services.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.cache.set_ttl_seconds, 300);
        assert_eq!(config.events.event_type_prefix, "aker.events.work_order");
        assert!(config.database.is_some());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let dir = std::env::temp_dir().join(format!("work-orders-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("work-orders.toml");

        let mut config = WorkOrdersConfig::default();
        config.services.lims_url = "http://lims.internal/api".to_string();
        config.cache.max_capacity = 42;
        config.save_to_file(&path).unwrap();

        let reloaded = WorkOrdersConfig::load_from(&path).unwrap();
        assert_eq!(reloaded.services.lims_url, "http://lims.internal/api");
        assert_eq!(reloaded.cache.max_capacity, 42);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = std::env::temp_dir().join(format!("work-orders-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("partial.toml");
        std::fs::write(&path, "[events]\nlims_id = \"lab-7\"\n").unwrap();

        let config = WorkOrdersConfig::load_from(&path).unwrap();
        assert_eq!(config.events.lims_id, "lab-7");
        assert_eq!(config.events.event_type_prefix, "aker.events.work_order");
        assert_eq!(config.cache.set_ttl_seconds, 300);

        std::fs::remove_dir_all(dir).unwrap();
    }
}
