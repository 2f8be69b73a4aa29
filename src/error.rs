use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// One offending input field.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Failure of a store write that the caller may want to report per field.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field} already exists")]
    Duplicate { field: &'static str },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),
    #[error("{0}")]
    BadRequest(String),
    #[error("Please authenticate")]
    Unauthorized,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Access denied")]
    Forbidden,
    #[error("{0}")]
    NotFound(String),
    #[error("{field} already exists")]
    Duplicate { field: &'static str },
    #[error("Too many requests, please try again later.")]
    RateLimited,
    #[error("Email service is not configured")]
    EmailNotConfigured,
    #[error("{0}")]
    EmailDelivery(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Duplicate { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::EmailNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            AppError::EmailDelivery(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { field } => AppError::Duplicate { field },
            StoreError::Other(e) => AppError::Internal(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(errors) => json!({
                "success": false,
                "message": self.to_string(),
                "errors": errors,
            }),
            AppError::Duplicate { field } => json!({
                "success": false,
                "message": self.to_string(),
                "errors": [FieldError::new(*field, self.to_string())],
            }),
            AppError::Internal(e) => {
                error!(error = ?e, "unhandled error");
                if cfg!(debug_assertions) {
                    json!({
                        "success": false,
                        "message": "Internal server error",
                        "detail": format!("{e:?}"),
                    })
                } else {
                    json!({ "success": false, "message": "Internal server error" })
                }
            }
            _ => json!({ "success": false, "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
