use axum::{http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct MetricsRecorder {
    handle: PrometheusHandle,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder");

        metrics::describe_counter!("allocations_total", "Conversations auto-allocated");
        metrics::describe_counter!("claims_total", "Conversations manually claimed");
        metrics::describe_counter!("resolutions_total", "Conversations resolved");
        metrics::describe_counter!(
            "grace_reclaims_total",
            "Conversations returned to the queue by the grace reclaimer"
        );
        metrics::describe_counter!(
            "idempotency_replays_total",
            "Responses served from the idempotency cache"
        );

        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for Prometheus metrics endpoint
pub async fn metrics_handler(handle: axum::extract::State<PrometheusHandle>) -> impl IntoResponse {
    let metrics = handle.render();
    (StatusCode::OK, metrics)
}
