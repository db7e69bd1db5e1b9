//! Payments Domain - canonical payment lifecycle and orchestration
//!
//! This crate is the heart of the payment core:
//! - the Payment Record aggregate and its monotonic state machine
//! - per-method request validation
//! - the store and provider-gateway ports
//! - the orchestrator (create/confirm/poll/refund) and webhook reconciler
//!
//! Provider protocol detail lives behind the [`ports::ProviderGateway`]
//! contract and never leaks into this crate.

pub mod billing;
pub mod error;
pub mod memory;
pub mod method;
pub mod orchestrator;
pub mod ports;
pub mod reconciler;
pub mod record;
pub mod status;
pub mod validation;

pub use billing::{Address, BankTransferDetails, BillPaymentDetails, BillService, BillingDetails};
pub use error::PaymentError;
pub use memory::InMemoryPaymentStore;
pub use method::{MethodDetails, PaymentMethod, ProviderName, Purpose};
pub use orchestrator::{
    CreatePaymentRequest, CreatedPayment, GatewayRegistry, PaymentOrchestrator,
};
pub use ports::{
    Confirmation, CreatedIntent, GatewayError, IntentRequest, PaymentStore, ProviderEvent,
    ProviderGateway, RefundEntryData, RefundOutcome, StatusWrite, StoreError,
};
pub use reconciler::{WebhookAck, WebhookDisposition, WebhookReconciler};
pub use record::{
    CorrelationKey, PaymentFailure, PaymentRecord, ProviderRefs, RefundEntry, RefundState,
    StatusAttempt, WebhookEventRecord,
};
pub use status::PaymentStatus;
pub use validation::{is_valid_clabe, validate_create, FieldError, ValidationError};
