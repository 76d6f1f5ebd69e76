use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

use crate::dto::public_dto::AttemptState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller's `expected_version` is stale. Carries the authoritative
    /// state so the caller can merge its local edits and retry.
    #[error("Version conflict: attempt is at version {}", .current.version)]
    VersionConflict { current: Box<AttemptState> },

    #[error("Attempt has already been submitted")]
    AttemptSubmitted,

    #[error("Attempt was closed as abandoned")]
    AttemptAbandoned,

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable code used in response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "config_error",
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "bad_request",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::VersionConflict { .. } => "version_conflict",
            Error::AttemptSubmitted => "attempt_submitted",
            Error::AttemptAbandoned => "attempt_abandoned",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();
        let (status, body) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": code, "message": msg })),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": code, "message": msg })),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, json!({ "error": code, "message": msg })),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": code, "message": msg })),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, json!({ "error": code, "message": err.to_string() })),
            Error::Json(err) => (StatusCode::BAD_REQUEST, json!({ "error": code, "message": err.to_string() })),
            Error::VersionConflict { current } => (
                StatusCode::CONFLICT,
                json!({
                    "error": code,
                    "message": format!("Attempt is at version {}", current.version),
                    "current": current,
                }),
            ),
            Error::AttemptSubmitted => (
                StatusCode::CONFLICT,
                json!({ "error": code, "message": "Attempt has already been submitted" }),
            ),
            Error::AttemptAbandoned => (
                StatusCode::GONE,
                json!({ "error": code, "message": "Attempt was closed after inactivity" }),
            ),
            Error::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": code, "message": "An unexpected error occurred" }),
                )
            }
            other => {
                tracing::error!(error = %other, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": code, "message": "An unexpected error occurred" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for Error {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Internal(format!("Migration failed: {}", err))
    }
}
