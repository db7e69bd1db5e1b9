//! Ports for the payment core
//!
//! Two seams connect the domain to the outside world: the durable store
//! holding Payment Records, and the per-provider gateway wrapping one
//! external payment network. Adapters implement these traits; the domain
//! depends only on the contracts here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use core_kernel::{Money, PaymentId, RefundId};

use crate::billing::BillingDetails;
use crate::method::{MethodDetails, PaymentMethod, ProviderName, Purpose};
use crate::record::{
    CorrelationKey, PaymentRecord, RefundState, WebhookEventRecord,
};
use crate::status::PaymentStatus;

/// Error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("refund would exceed the remaining refundable balance")]
    RefundExceedsBalance,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result of a monotonic status write
#[derive(Debug, Clone)]
pub struct StatusWrite {
    /// Whether the write represented forward progress and took effect
    pub advanced: bool,
    /// The record as stored after the write
    pub record: PaymentRecord,
}

/// Durable store for Payment Records
///
/// Implementations must make `apply_status` an atomic read-modify-write
/// against one record (compare-and-swap or a single-record transaction) so
/// two concurrent writers cannot both decide "this is forward progress"
/// from stale reads. `reserve_refund` must be serialized per record.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a freshly created record
    async fn insert(&self, record: &PaymentRecord) -> Result<(), StoreError>;

    /// Loads a record by its canonical id
    async fn fetch(&self, id: PaymentId) -> Result<Option<PaymentRecord>, StoreError>;

    /// Locates the record a provider event refers to
    async fn find_by_correlation(
        &self,
        provider: ProviderName,
        key: &CorrelationKey,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    /// Binds provider-side identifiers; existing values are never
    /// overwritten
    async fn bind_provider(
        &self,
        id: PaymentId,
        external_payment_id: Option<&str>,
        tracking_key: Option<&str>,
        charge_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Applies a canonical status iff it is forward progress
    async fn apply_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<StatusWrite, StoreError>;

    /// Applies `Failed` and stores the failure detail
    async fn mark_failed(
        &self,
        id: PaymentId,
        code: &str,
        message: &str,
    ) -> Result<StatusWrite, StoreError>;

    /// Appends a verified webhook event to the record's event log
    async fn append_webhook_event(
        &self,
        id: PaymentId,
        event: &WebhookEventRecord,
    ) -> Result<(), StoreError>;

    /// Atomically reserves a refund against the remaining balance
    ///
    /// Fails with [`StoreError::RefundExceedsBalance`] when the pending and
    /// completed refund total plus this amount would exceed the payment
    /// amount.
    async fn reserve_refund(
        &self,
        id: PaymentId,
        refund: &RefundEntryData,
    ) -> Result<(), StoreError>;

    /// Settles a previously reserved refund with the provider outcome
    async fn settle_refund(
        &self,
        id: PaymentId,
        refund_id: RefundId,
        state: RefundState,
        external_refund_id: Option<&str>,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}

/// Data for reserving a refund entry
#[derive(Debug, Clone)]
pub struct RefundEntryData {
    pub id: RefundId,
    pub amount: Money,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Request passed to a gateway when creating a provider intent
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub payment_id: PaymentId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub purpose: Purpose,
    pub billing: BillingDetails,
}

/// Result of creating a provider intent
#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub external_payment_id: String,
    pub tracking_key: Option<String>,
    /// Secret the client needs to complete checkout, when the provider
    /// issues one
    pub client_secret: Option<String>,
}

/// Result of confirming a provider intent
#[derive(Debug, Clone)]
pub struct Confirmation {
    pub charge_id: String,
    /// The provider's native status string, kept for diagnostics
    pub raw_status: String,
    /// The canonical mapping of `raw_status`
    pub status: PaymentStatus,
}

/// Result of requesting a refund from a provider
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub external_refund_id: String,
    pub state: RefundState,
}

/// A verified, decoded provider webhook event
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    /// The provider's event type string (e.g., "charge.paid")
    pub event_type: String,
    /// The key that identifies which payment this event belongs to
    pub correlation: CorrelationKey,
    /// Canonical mapping of the event; unknown events map to `Processing`
    pub status: PaymentStatus,
    /// Charge/capture id carried by the event, when present
    pub charge_id: Option<String>,
    /// The raw decoded payload, recorded for forensic replay
    pub payload: serde_json::Value,
}

/// Error type for gateway operations
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The provider declined the specific request; retrying with the same
    /// parameters will not succeed
    #[error("provider rejected the request [{code}]: {message}")]
    Rejected { code: String, message: String },

    /// Transient network or provider fault; the whole operation is safe to
    /// retry
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// Credential problem; fatal to the deployment, not the request
    #[error("provider authentication failed: {0}")]
    Auth(String),

    /// The provider rejected a refund (outside window, already refunded)
    #[error("not refundable: {0}")]
    NotRefundable(String),

    /// A webhook payload could not be decoded
    #[error("malformed provider payload: {0}")]
    Malformed(String),
}

/// The fixed integration contract each provider implements
///
/// New providers are added by writing a new gateway, never by branching
/// orchestrator logic on provider name outside adapter selection. Request
/// signing and credential refresh are internal to each implementation.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    fn name(&self) -> ProviderName;

    /// How long after completion the provider accepts refunds
    fn refund_window_days(&self) -> i64;

    /// Registers the payment with the provider
    async fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError>;

    /// Confirms a previously created intent
    ///
    /// Idempotent: confirming an already-confirmed intent returns the
    /// existing result, because the caller may retry after a timeout.
    async fn confirm(
        &self,
        external_payment_id: &str,
        details: &MethodDetails,
    ) -> Result<Confirmation, GatewayError>;

    /// Fetches the provider's current status, mapped into the canonical set
    ///
    /// The mapping is total: every native status maps to exactly one
    /// canonical status, with unknown values defaulting to `Processing`.
    async fn get_status(&self, external_payment_id: &str) -> Result<PaymentStatus, GatewayError>;

    /// Requests a (possibly partial) refund of a captured charge
    async fn refund(
        &self,
        charge_id: &str,
        amount: Money,
        reason: &str,
    ) -> Result<RefundOutcome, GatewayError>;

    /// Verifies the authenticity of an inbound webhook delivery
    ///
    /// Pure and side-effect free; HMAC-style schemes must compare in
    /// constant time.
    fn verify_webhook_signature(&self, headers: &http::HeaderMap, raw_body: &[u8]) -> bool;

    /// Decodes a verified webhook body into a provider event
    fn interpret_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, GatewayError>;
}
