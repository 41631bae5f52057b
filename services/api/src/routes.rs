use crate::infra::AppState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Extension;
use axum::Json;
use risk_engine::scoring::{scoring_router, ScoringContext};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_scoring_routes(context: Arc<ScoringContext>) -> axum::Router {
    let health = axum::Router::new()
        .route("/health", get(healthcheck))
        .with_state(context.clone());

    scoring_router(context)
        .merge(health)
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

/// Liveness plus enough model metadata for operators to confirm which
/// artifact revision is serving.
pub(crate) async fn healthcheck(
    State(context): State<Arc<ScoringContext>>,
) -> Json<serde_json::Value> {
    let metadata = context.metadata();
    Json(json!({
        "status": "ok",
        "service": "credit-risk-scoring",
        "model_kind": metadata.model_kind,
        "artifact_version": metadata.format_version,
        "feature_count": metadata.feature_count,
        "tree_count": metadata.tree_count,
        "threshold": metadata.threshold,
    }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
