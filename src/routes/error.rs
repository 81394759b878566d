use std::time::Duration;

use axum::extract::rejection::QueryRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::generation::SubmitError;
use crate::services::throttle::ThrottleError;

/// Errors surfaced by HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error")]
    Validation(Vec<String>),

    #[error("Server is busy. Please try again later.")]
    Capacity,

    #[error("Too many requests. Please slow down.")]
    RateLimited { retry_after: Duration },

    #[error("Image not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{message}")]
    Generation { image_id: String, message: String },
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::Validation(report) => ApiError::Validation(
                report
                    .iter()
                    .map(|(path, error)| format!("{path}: {error}"))
                    .collect(),
            ),
            SubmitError::RateLimited(ThrottleError::RateLimited { retry_after }) => {
                ApiError::RateLimited { retry_after }
            }
            SubmitError::Capacity(_) => ApiError::Capacity,
            SubmitError::Generation { image_id, source } => ApiError::Generation {
                image_id,
                message: source.to_string(),
            },
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(vec![rejection.body_text()])
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        match self {
            ApiError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": message, "details": details })),
            )
                .into_response(),
            ApiError::Capacity => {
                (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": message }))).into_response()
            }
            ApiError::RateLimited { retry_after } => {
                let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
                let mut response =
                    (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": message })))
                        .into_response();
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
                response
            }
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Generation { image_id, .. } => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": message, "imageId": image_id })),
            )
                .into_response(),
        }
    }
}
