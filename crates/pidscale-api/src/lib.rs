//! pidscale-api — read-only HTTP surface of the daemon.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/targets` | List managed targets |
//! | GET | `/api/v1/targets/{key}` | Config, latest gauges and desired replicas (`key` is `ns%2Fname`) |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness and active loop count |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use pidscale_autoscale::{ReplicaLedger, WorkerManager};
use pidscale_metrics::MetricsRegistry;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<WorkerManager>,
    pub metrics: MetricsRegistry,
    pub ledger: ReplicaLedger,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/targets", get(handlers::list_targets))
        .route("/targets/{key}", get(handlers::get_target));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
}
