use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Payment verification failed: {0}")]
    PaymentVerification(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientInventory(_) => StatusCode::CONFLICT,
            AppError::InvalidStateTransition(_) => StatusCode::CONFLICT,
            AppError::PaymentVerification(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InsufficientFunds(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::InsufficientInventory(_) => "INSUFFICIENT_INVENTORY",
            AppError::InvalidStateTransition(_) => "INVALID_STATE_TRANSITION",
            AppError::PaymentVerification(_) => "PAYMENT_VERIFICATION_FAILED",
            AppError::InsufficientFunds(_) => "INSUFFICIENT_FUNDS",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Whether a client may safely retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::InsufficientInventory(_)
                | AppError::ExternalServiceError(_)
                | AppError::DatabaseError(_)
                | AppError::InternalServerError(_)
        )
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::InsufficientInventory(msg)
            | AppError::InvalidStateTransition(msg)
            | AppError::PaymentVerification(msg)
            | AppError::InsufficientFunds(msg)
            | AppError::ExternalServiceError(msg)
            | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::NotFound(msg)
            | AppError::InsufficientInventory(msg)
            | AppError::InvalidStateTransition(msg)
            | AppError::PaymentVerification(msg)
            | AppError::InsufficientFunds(msg)
            | AppError::ExternalServiceError(msg)
            | AppError::InternalServerError(msg) => msg.clone(),
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
        };

        // Do not expose internal details in the API response
        let details = None;

        error_response(code, public_message, details, status)
    }
}
