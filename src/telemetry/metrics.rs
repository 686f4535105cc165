//! Prometheus metrics for the portal API.

use axum::{http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        if let Some(handle) = PROMETHEUS_HANDLE.get() {
            return Self {
                handle: Some(handle.clone()),
            };
        }

        match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                let handle = PROMETHEUS_HANDLE.get_or_init(|| handle);
                Self {
                    handle: Some(handle.clone()),
                }
            }
            Err(e) => {
                warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(|h| h.render())
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    match state.render() {
        Some(metrics) => (StatusCode::OK, metrics),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AuthOutcome {
    Success,
    InvalidCredentials,
    AccountLocked,
    AccountInactive,
    TokenRevoked,
}

impl AuthOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::AccountLocked => "account_locked",
            AuthOutcome::AccountInactive => "account_inactive",
            AuthOutcome::TokenRevoked => "token_revoked",
        }
    }
}

pub fn record_auth_attempt(action: &str, outcome: AuthOutcome) {
    counter!(
        "auth_attempts_total",
        "action" => action.to_string(),
        "outcome" => outcome.as_str().to_string()
    )
    .increment(1);
}

pub fn record_permission_check(permission: &'static str, cached: bool, granted: bool, duration: Duration) {
    counter!(
        "permission_checks_total",
        "permission" => permission,
        "cached" => cached.to_string(),
        "granted" => granted.to_string()
    )
    .increment(1);

    histogram!(
        "permission_check_duration_seconds",
        "cached" => cached.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Counts workspace sync-state requests, labelled by whether the caller was allowed.
pub fn record_sync_poll(granted: bool) {
    counter!("workspace_sync_polls_total", "granted" => granted.to_string()).increment(1);
}

pub fn record_upload(kind: &'static str, accepted: bool) {
    counter!(
        "media_uploads_total",
        "kind" => kind,
        "accepted" => accepted.to_string()
    )
    .increment(1);
}

pub fn record_rate_limited(bucket: &'static str) {
    counter!("rate_limited_requests_total", "bucket" => bucket).increment(1);
}

pub fn record_request_latency(method: &str, path: &str, status: u16, duration: Duration) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_outcome_labels() {
        assert_eq!(AuthOutcome::Success.as_str(), "success");
        assert_eq!(AuthOutcome::AccountLocked.as_str(), "account_locked");
        assert_eq!(AuthOutcome::TokenRevoked.as_str(), "token_revoked");
    }

    #[test]
    fn test_disabled_state_renders_nothing() {
        let state = MetricsState::disabled();
        assert!(!state.is_enabled());
        assert!(state.render().is_none());
    }

    #[test]
    fn test_recording_without_recorder_is_a_no_op() {
        record_sync_poll(true);
        record_upload("banner", false);
        record_rate_limited("token");
        record_permission_check("can_manage_events", false, true, Duration::from_millis(1));
    }
}
