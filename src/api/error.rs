use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::api::dto::{ErrorResponse, LimitReachedResponse};
use crate::orchestrator::{CoachError, LIMIT_REACHED_MESSAGE};

const GENERIC_ERROR: &str = "Something went wrong. Please try again.";
const COACH_UNAVAILABLE: &str = "Coach is temporarily unavailable";

/// HTTP face of `CoachError`. Internal causes are logged by the orchestrator
/// and never copied into response bodies.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    LimitReached,
    Unavailable,
    Internal,
}

impl From<CoachError> for ApiError {
    fn from(err: CoachError) -> Self {
        match err {
            CoachError::Validation(msg) => ApiError::BadRequest(msg),
            CoachError::NotFound(msg) => ApiError::NotFound(msg),
            CoachError::QuotaExceeded { .. } => ApiError::LimitReached,
            CoachError::LlmUnavailable => ApiError::Unavailable,
            CoachError::Persistence(_) | CoachError::QuotaRead(_) | CoachError::LlmCall(_) => {
                tracing::error!("Coach request failed: {}", err);
                ApiError::Internal
            }
        }
    }
}

fn error_body(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => error_body(StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => error_body(StatusCode::NOT_FOUND, msg),
            ApiError::LimitReached => (
                StatusCode::PAYMENT_REQUIRED,
                Json(LimitReachedResponse {
                    error: "Weekly limit reached".to_string(),
                    limit_reached: true,
                    message: LIMIT_REACHED_MESSAGE.to_string(),
                    messages_remaining: 0,
                }),
            )
                .into_response(),
            ApiError::Unavailable => error_body(StatusCode::SERVICE_UNAVAILABLE, COACH_UNAVAILABLE),
            ApiError::Internal => error_body(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR),
        }
    }
}
