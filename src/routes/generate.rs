use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::generation::{GenerateRequest, SubmitResponse};
use crate::routes::error::ApiError;

/// GET /generateImage?prompt=…&loraName=…: Submit a prompt for generation.
///
/// Unstyled prompts run through the provider synchronously when the fast
/// path is enabled; everything else is queued for the browser worker.
pub async fn generate_image(
    State(state): State<AppState>,
    query: Result<Query<GenerateRequest>, QueryRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Query(request) = query?;
    let submission = state.generation.submit(request).await?;

    Ok(Json(SubmitResponse {
        success: true,
        image_id: submission.image_id().to_string(),
    }))
}
