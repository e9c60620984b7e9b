use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use bulletin_db::is_unique_violation;
use bulletin_types::views::FieldErrors;

/// Errors a web handler can end in. Store failures are folded into
/// `Internal` and never shown to the client beyond a generic message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn field(field: &str, message: &str) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    /// A store error, reported against `field` when a unique constraint
    /// rejected the write.
    pub fn unique_or_internal(err: anyhow::Error, field: &str, message: &str) -> Self {
        if is_unique_violation(&err) {
            Self::field(field, message)
        } else {
            Self::Internal(err)
        }
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        Self::Validation(errors)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "errors": errors }))).into_response()
            }
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
            }
            Self::Forbidden(notice) => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": notice }))).into_response()
            }
            Self::Internal(e) => {
                error!("internal server error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
