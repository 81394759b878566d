use axum::extract::{Path, State};
use axum::Json;

use crate::app_state::AppState;
use crate::models::job::StatusRecord;
use crate::routes::error::ApiError;

/// GET /status/{image_id}: Current lifecycle record of an image.
pub async fn get_status(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> Result<Json<StatusRecord>, ApiError> {
    state
        .generation
        .status(&image_id)
        .map(Json)
        .ok_or(ApiError::NotFound)
}
