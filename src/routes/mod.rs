use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod auth;
pub mod error;
pub mod events;
pub mod generate;
pub mod health;
pub mod metrics;
pub mod status;

/// Build the full HTTP router.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/generateImage", get(generate::generate_image))
        .route("/status/{image_id}", get(status::get_status))
        .route("/events/{image_id}", get(events::job_events))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::prometheus_metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
}
