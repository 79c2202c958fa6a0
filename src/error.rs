use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;

/// Standard API error response body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

/// Application-facing error kinds, mapped onto the §7 error taxonomy.
#[derive(Debug)]
pub enum AppError {
    Validation { field: String, message: String },
    Conflict { code: &'static str, message: String },
    NotFound { resource: String, id: String },
    Operational(String),
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Operational(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Conflict { code, .. } => code,
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Operational(_) => "OPERATIONAL_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        match self {
            AppError::Validation { field, message } => {
                ApiError::new(self.error_code(), message).with_field(field.clone())
            }
            AppError::Conflict { message, .. } => ApiError::new(self.error_code(), message),
            AppError::NotFound { resource, id } => {
                ApiError::new(self.error_code(), format!("{resource} not found: {id}"))
            }
            AppError::Operational(_) => {
                ApiError::new(self.error_code(), "The matchmaking store is unavailable")
            }
            AppError::Internal(_) => {
                ApiError::new(self.error_code(), "An internal error occurred")
            }
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation { field, message } => {
                write!(f, "validation error on {field}: {message}")
            }
            AppError::Conflict { code, message } => write!(f, "conflict ({code}): {message}"),
            AppError::NotFound { resource, id } => write!(f, "{resource} not found: {id}"),
            AppError::Operational(msg) => write!(f, "operational error: {msg}"),
            AppError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let api_error = self.to_api_error();

        match &self {
            AppError::Operational(msg) => tracing::error!("operational failure: {msg}"),
            AppError::Internal(msg) => tracing::error!("internal error: {msg}"),
            _ => tracing::debug!("api error: {self}"),
        }

        (status, Json(api_error)).into_response()
    }
}

/// Errors raised by the store adapter and engine, internal to the core.
/// The Facade is the only place these get translated into `AppError`.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Lost a race (binding conflict, not-active, already-queued). Expected,
    /// not logged as a failure.
    Conflict(&'static str),
    /// Transient store failure: timeout, connection loss. Retried by the caller.
    Transient(String),
    /// A read found no such row.
    NotFound(&'static str),
    /// An invariant the store is supposed to guarantee did not hold.
    Invariant(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Conflict(code) => write!(f, "conflict: {code}"),
            StoreError::Transient(msg) => write!(f, "transient store error: {msg}"),
            StoreError::NotFound(what) => write!(f, "not found: {what}"),
            StoreError::Invariant(msg) => write!(f, "invariant violated: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("row"),
            other => StoreError::Transient(other.to_string()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(code) => AppError::conflict(code, "conflict"),
            StoreError::Transient(msg) => AppError::Operational(msg),
            StoreError::NotFound(what) => AppError::not_found(what, "unknown"),
            StoreError::Invariant(msg) => AppError::Internal(msg),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            AppError::validation("score", "bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::conflict("ALREADY_QUEUED", "x").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::not_found("Match", "1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Operational("down".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn store_conflict_becomes_409() {
        let err: AppError = StoreError::Conflict("NOT_ACTIVE").into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), "NOT_ACTIVE");
    }
}
