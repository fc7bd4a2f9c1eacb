//! REST API handlers.
//!
//! Every handler reads a snapshot of the registry, metrics or ledger and
//! returns JSON, except `/metrics` which returns Prometheus text.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use pidscale_autoscale::DesiredReplicas;
use pidscale_core::TargetConfig;
use pidscale_metrics::TargetMetrics;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(Serialize)]
struct ApiResponse<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// One row of the target list.
#[derive(Debug, Serialize)]
pub struct TargetSummary {
    pub key: String,
    pub workload: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub interval: u32,
    pub cooldown: u32,
    pub desired_replicas: Option<u32>,
}

/// Everything known about one target.
#[derive(Debug, Serialize)]
pub struct TargetDetail {
    pub key: String,
    pub config: TargetConfig,
    pub metrics: Option<TargetMetrics>,
    pub desired: Option<DesiredReplicas>,
}

// ── Targets ────────────────────────────────────────────────────

/// GET /api/v1/targets
pub async fn list_targets(State(state): State<ApiState>) -> impl IntoResponse {
    let targets: Vec<TargetSummary> = state
        .manager
        .registry()
        .snapshot()
        .await
        .into_iter()
        .map(|(key, config)| {
            let workload = config.target.workload();
            TargetSummary {
                desired_replicas: state.ledger.get(&workload).map(|d| d.replicas),
                key,
                workload,
                min_replicas: config.target.min_replicas,
                max_replicas: config.target.max_replicas,
                interval: config.interval,
                cooldown: config.cooldown,
            }
        })
        .collect();
    ApiResponse::ok(targets)
}

/// GET /api/v1/targets/{key}
pub async fn get_target(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    match state.manager.registry().get(&key).await {
        Some(config) => {
            let desired = state.ledger.get(&config.target.workload());
            let detail = TargetDetail {
                metrics: state.metrics.get(&key),
                key,
                config,
                desired,
            };
            ApiResponse::ok(detail).into_response()
        }
        None => error_response("target not found", StatusCode::NOT_FOUND).into_response(),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    if state.manager.is_shutting_down() {
        return error_response("shutting down", StatusCode::SERVICE_UNAVAILABLE).into_response();
    }
    ApiResponse::ok(serde_json::json!({
        "active_workers": state.manager.active_workers(),
        "targets": state.manager.registry().len().await,
    }))
    .into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.render(),
    )
}
