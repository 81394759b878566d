use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub queue: QueueHealth,
    pub tracked_jobs: usize,
    pub provider_fast_path: bool,
}

#[derive(Serialize)]
pub struct QueueHealth {
    pub status: String,
    pub depth: usize,
    pub capacity: usize,
}

/// GET /health: Service status with queue occupancy.
///
/// Reports `degraded` (503) while the queue is full, since browser-bound
/// requests are being turned away.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let queue = state.generation.queue();
    let full = queue.is_full();

    let queue_check = QueueHealth {
        status: if full { "full" } else { "ok" }.to_string(),
        depth: queue.size(),
        capacity: queue.capacity(),
    };

    let status_code = if full {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let response = HealthResponse {
        status: if full { "degraded" } else { "ok" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            queue: queue_check,
            tracked_jobs: state.generation.tracked_jobs(),
            provider_fast_path: state.generation.fast_path_enabled(),
        },
    };

    (status_code, Json(response))
}
