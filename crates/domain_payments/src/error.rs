//! The canonical error taxonomy for payment operations

use thiserror::Error;

use core_kernel::PaymentId;

use crate::ports::{GatewayError, StoreError};
use crate::status::PaymentStatus;
use crate::validation::ValidationError;

/// Error type surfaced by the orchestrator and reconciler
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The caller's request is malformed; not retried automatically
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The provider declined this request; retrying with the same
    /// parameters will not succeed
    #[error("provider rejected the request [{code}]: {message}")]
    ProviderRejected { code: String, message: String },

    /// Transient provider fault; the whole operation is safe to retry
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Integration misconfiguration; fatal to the deployment, not the
    /// request, and must alert operators
    #[error("provider authentication failed: {0}")]
    ProviderAuth(String),

    #[error("payment not found: {0}")]
    NotFound(PaymentId),

    /// The record is in a terminal state that cannot absorb this operation
    #[error("payment is already {status}")]
    AlreadyTerminal { status: PaymentStatus },

    #[error("payment not refundable: {0}")]
    NotRefundable(String),

    /// Webhook rejected; logged as a potential security event
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// The record cannot absorb this operation in its current state
    #[error("invalid payment state: {0}")]
    InvalidState(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PaymentError {
    /// Returns true when retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::ProviderUnavailable(_)
                | PaymentError::Store(StoreError::Connection(_))
        )
    }
}

impl From<GatewayError> for PaymentError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Rejected { code, message } => {
                PaymentError::ProviderRejected { code, message }
            }
            GatewayError::Unavailable(message) => PaymentError::ProviderUnavailable(message),
            GatewayError::Auth(message) => PaymentError::ProviderAuth(message),
            GatewayError::NotRefundable(message) => PaymentError::NotRefundable(message),
            GatewayError::Malformed(message) => PaymentError::ProviderRejected {
                code: "malformed_payload".to_string(),
                message,
            },
        }
    }
}
