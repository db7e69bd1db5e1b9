//! API error handling
//!
//! Maps the canonical payment taxonomy onto HTTP. Retryable provider
//! faults carry a `retryable` flag so clients can distinguish "try again"
//! from "fix your request".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use domain_payments::{FieldError, PaymentError};

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details, retryable) = match &self {
            ApiError::Payment(error) => return payment_error_response(error),
            ApiError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "not_found", msg.clone(), None, None)
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Unauthorized".to_string(),
                None,
                None,
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                msg.clone(),
                None,
                None,
            ),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
            retryable,
        };
        (status, Json(body)).into_response()
    }
}

fn payment_error_response(error: &PaymentError) -> Response {
    let (status, error_type, message, details, retryable) = match error {
        PaymentError::Validation(validation) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "validation_error",
            "request validation failed".to_string(),
            Some(validation.details.clone()),
            None,
        ),
        PaymentError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            "not_found",
            format!("payment {id} not found"),
            None,
            None,
        ),
        PaymentError::AlreadyTerminal { status } => (
            StatusCode::CONFLICT,
            "already_terminal",
            format!("payment is already {status}"),
            None,
            None,
        ),
        PaymentError::NotRefundable(reason) => (
            StatusCode::CONFLICT,
            "not_refundable",
            reason.clone(),
            None,
            None,
        ),
        PaymentError::ProviderRejected { code, .. } => (
            StatusCode::PAYMENT_REQUIRED,
            "provider_rejected",
            format!("the payment provider declined the request ({code})"),
            None,
            Some(false),
        ),
        PaymentError::ProviderUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "provider_unavailable",
            "the payment provider is temporarily unavailable".to_string(),
            None,
            Some(true),
        ),
        PaymentError::ProviderAuth(_) => (
            StatusCode::BAD_GATEWAY,
            "provider_auth",
            "the payment provider rejected our credentials".to_string(),
            None,
            Some(false),
        ),
        PaymentError::InvalidSignature => (
            StatusCode::BAD_REQUEST,
            "invalid_signature",
            "webhook signature verification failed".to_string(),
            None,
            None,
        ),
        PaymentError::InvalidState(reason) => (
            StatusCode::CONFLICT,
            "invalid_state",
            reason.clone(),
            None,
            None,
        ),
        PaymentError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "internal error".to_string(),
            None,
            None,
        ),
    };

    let body = ErrorResponse {
        error: error_type.to_string(),
        message,
        details,
        retryable,
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use domain_payments::ValidationError;

    #[test]
    fn test_validation_maps_to_422() {
        let error =
            ApiError::Payment(ValidationError::single("amount", "must be positive").into());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_provider_unavailable_maps_to_503() {
        let error = ApiError::Payment(PaymentError::ProviderUnavailable("timeout".into()));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_not_refundable_maps_to_409() {
        let error = ApiError::Payment(PaymentError::NotRefundable("window elapsed".into()));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
