//! API errors

use crate::models::ErrorResponse;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use cloudgate_core::Denial;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Instance verification failed: {}", .0.reason())]
    VerificationFailed(Denial),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"cloudgate\"")],
                Json(ErrorResponse::new("unauthorized", &message)),
            )
                .into_response(),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("bad_request", &message)),
            )
                .into_response(),
            Self::VerificationFailed(denial) => (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new(
                    "instance_verification_failed",
                    denial.public_message(),
                )),
            )
                .into_response(),
            Self::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("internal_error", "Internal server error")),
                )
                    .into_response()
            }
        }
    }
}
