//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bizdir_billing::{BillingError, PlanChangeError};
use serde_json::json;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,

    // Resource errors
    #[error("Resource not found")]
    NotFound,
    #[error("Resource already exists")]
    Conflict(String),

    // Internal errors
    #[error("Database error: {0}")]
    Database(String),
    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            // Resources
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),

            // Internal
            ApiError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR", "Database error".to_string()),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", self.to_string()),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::NotFound(_) => ApiError::NotFound,
            BillingError::AlreadyExists(msg) => ApiError::Conflict(msg),
            BillingError::Database(msg) => {
                tracing::error!(error = %msg, "Billing store error");
                ApiError::Database(msg)
            }
            BillingError::Config(msg) | BillingError::Internal(msg) => {
                tracing::error!(error = %msg, "Billing internal error");
                ApiError::Internal
            }
        }
    }
}

/// Error envelope for the plan-change endpoint.
///
/// Unlike [`ApiError`], the body is flat (`success`, `error`, `code`) because
/// the dashboard branches on `code` to decide whether to prompt for a card.
#[derive(Debug)]
pub struct PlanChangeFailure(pub PlanChangeError);

impl From<PlanChangeError> for PlanChangeFailure {
    fn from(err: PlanChangeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for PlanChangeFailure {
    fn into_response(self) -> Response {
        let err = self.0;
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = err.to_string();

        let body = if err.is_recoverable() {
            json!({
                "success": false,
                "error": message,
                "code": err.code(),
                "requires_payment_method": true,
                "message": "Please add a payment method before changing plans",
            })
        } else {
            json!({
                "success": false,
                "error": message,
                "code": err.code(),
            })
        };

        (status, Json(body)).into_response()
    }
}
