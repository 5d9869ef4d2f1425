use axum::{
    Json,
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::Detail;

/// AppError
///
/// The single error taxonomy shared by the stores, the policy and the handlers.
/// Expected outcomes (missing rows, duplicate emails, forbidden mutations) are plain
/// variants; only `Internal` represents a genuinely exceptional condition.
#[derive(Debug, Error)]
pub enum AppError {
    /// Entity absent. Rendered as 404.
    #[error("{0}")]
    NotFound(&'static str),

    /// Duplicate email. Rendered as 400 to match the public API contract.
    #[error("{0}")]
    Conflict(String),

    /// Missing, malformed, expired or orphaned bearer token. Rendered as 401.
    #[error("Could not validate credentials")]
    Unauthenticated,

    /// Authenticated, but neither owner nor admin. Rendered as 403.
    #[error("Not enough permissions")]
    Forbidden,

    /// Malformed input or a rule violation detected at the boundary. Rendered as 400.
    #[error("{0}")]
    BadRequest(String),

    /// Storage failure or broken invariant. Logged, rendered as an opaque 500.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = match &self {
            AppError::Internal(msg) => {
                tracing::error!("request failed: {}", msg);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(Detail { detail })).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict("Email already registered.".to_string())
            }
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::NotFound("Referenced record not found")
            }
            _ => {
                tracing::error!("database error: {:?}", e);
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(e.to_string())
    }
}

// Extractor rejections are validation failures; the boundary answers them with 400.

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
