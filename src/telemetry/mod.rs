//! Observability: tracing, metrics, and OpenTelemetry integration.

pub mod metrics;
pub mod tracing;

pub use metrics::{
    record_auth_attempt, record_permission_check, record_sync_poll, record_upload, AuthOutcome,
    MetricsState,
};
pub use tracing::init_telemetry;
