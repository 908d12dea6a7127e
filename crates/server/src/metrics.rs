//! Prometheus metrics

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;
use crate::ServerError;

/// Install the global recorder
///
/// Must be called once at startup, before any metric is recorded.
pub fn init_metrics() -> Result<PrometheusHandle, ServerError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| {
            ServerError::Startup(format!("Failed to install Prometheus recorder: {}", e))
        })?;

    register_default_metrics();
    Ok(handle)
}

fn register_default_metrics() {
    metrics::gauge!("guided_audio_active_runs").set(0.0);
    metrics::counter!("guided_audio_requests_total", "endpoint" => "synthesize").absolute(0);
    metrics::counter!("guided_audio_requests_total", "endpoint" => "assets").absolute(0);
    metrics::counter!("guided_audio_runs_total", "outcome" => "done").absolute(0);
    metrics::counter!("guided_audio_runs_total", "outcome" => "error").absolute(0);
    metrics::counter!("guided_audio_runs_total", "outcome" => "aborted").absolute(0);
}

/// `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics disabled\n".to_string(),
        ),
    }
}
