use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::model::{JobId, OrderId, PlanId};

/// Initialize structured logging. RUST_LOG wins over the configured level.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;

    if config.json_logs {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .with(filter)
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(filter)
            .try_init()?;
    }

    tracing::info!("Work-order telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one dispatch attempt of an order
pub fn create_dispatch_span(plan_id: PlanId, order_id: OrderId, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "dispatch",
        plan.id = %plan_id,
        order.id = %order_id,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}

/// Span covering one job state transition
pub fn create_job_span(job_id: JobId, operation: &str, correlation_id: &str) -> tracing::Span {
    tracing::info_span!(
        "job_transition",
        job.id = %job_id,
        operation = operation,
        correlation.id = correlation_id,
        otel.kind = "internal"
    )
}
