//! Prometheus metrics
//!
//! The `metrics` facade is used throughout the workspace; this module
//! installs the Prometheus recorder and renders it for `GET /metrics`.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::state::AppState;

const LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Install the global Prometheus recorder
///
/// Returns `None` when a recorder is already installed.
pub fn init_metrics() -> Option<PrometheusHandle> {
    let builder = match PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Suffix("_seconds".to_string()), LATENCY_BUCKETS)
    {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!(error = %e, "Invalid histogram buckets, using summaries");
            PrometheusBuilder::new()
        },
    };

    match builder.install_recorder() {
        Ok(handle) => {
            describe();
            Some(handle)
        },
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
            None
        },
    }
}

fn describe() {
    metrics::describe_counter!(
        "campus_assist_chat_actions_total",
        "Chat actions handled, by action type"
    );
    metrics::describe_counter!(
        "campus_assist_provider_failures_total",
        "Failed calls to the completion or embedding provider, by component"
    );
    metrics::describe_counter!(
        "campus_assist_classifier_fallbacks_total",
        "Classifications answered by the keyword fallback"
    );
    metrics::describe_histogram!(
        "campus_assist_retrieval_seconds",
        metrics::Unit::Seconds,
        "Knowledge retrieval latency"
    );
    metrics::describe_histogram!(
        "campus_assist_completion_seconds",
        metrics::Unit::Seconds,
        "Answer completion latency"
    );
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics() {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
