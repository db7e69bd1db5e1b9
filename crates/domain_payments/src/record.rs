//! The Payment Record aggregate
//!
//! The only entity with durable identity in the core. A record is created
//! once, mutated through monotonic status writes and append-only logs, and
//! never deleted.
//!
//! # Invariants
//!
//! - `provider.name` is assigned exactly once, at creation, and never
//!   reassigned
//! - external provider identifiers are bound once and never destructively
//!   overwritten
//! - `status` only moves forward through the lifecycle order, except the
//!   refund branch from `Completed`
//! - the sum of non-failed refund amounts never exceeds the payment amount

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Money, PaymentId, RefundId, UserId, WebhookEventId};

use crate::billing::BillingDetails;
use crate::method::{PaymentMethod, ProviderName, Purpose};
use crate::status::PaymentStatus;

/// Provider-side identifiers for a payment
///
/// The only place provider-specific identifiers live. Fields are set once
/// as the provider assigns them and are never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRefs {
    pub name: ProviderName,
    /// The provider's own id for the payment intent/order
    pub external_payment_id: Option<String>,
    /// Tracking key for networks that correlate by clave de rastreo
    pub tracking_key: Option<String>,
    /// Charge/capture id assigned at confirmation
    pub charge_id: Option<String>,
}

impl ProviderRefs {
    pub fn new(name: ProviderName) -> Self {
        Self {
            name,
            external_payment_id: None,
            tracking_key: None,
            charge_id: None,
        }
    }

    /// Returns true if any bound identifier matches the correlation key
    pub fn matches(&self, key: &CorrelationKey) -> bool {
        match key {
            CorrelationKey::ExternalPaymentId(id) => {
                self.external_payment_id.as_deref() == Some(id.as_str())
            }
            CorrelationKey::TrackingKey(key) => {
                self.tracking_key.as_deref() == Some(key.as_str())
            }
            CorrelationKey::ChargeId(id) => self.charge_id.as_deref() == Some(id.as_str()),
        }
    }
}

/// The provider-side key a webhook event carries to identify its payment
///
/// Which variant applies depends on the provider: the card processor
/// correlates by order id or charge id, the interbank network by tracking
/// key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CorrelationKey {
    ExternalPaymentId(String),
    TrackingKey(String),
    ChargeId(String),
}

/// One entry in the append-only status transition log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusAttempt {
    pub status: PaymentStatus,
    pub occurred_at: DateTime<Utc>,
}

/// One verified inbound provider event, recorded before application
///
/// Duplicates are recorded too; the log exists for forensic replay analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub id: WebhookEventId,
    pub event_type: String,
    pub received_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl WebhookEventRecord {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: WebhookEventId::new_v7(),
            event_type: event_type.into(),
            received_at: Utc::now(),
            payload,
        }
    }
}

/// Lifecycle state of a single refund entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundState {
    /// Reserved against the balance, provider call in flight
    Pending,
    /// Provider accepted the refund
    Completed,
    /// Provider rejected the refund; does not count against the balance
    Failed,
}

/// One refund against a completed payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundEntry {
    pub id: RefundId,
    pub amount: Money,
    pub reason: String,
    pub state: RefundState,
    pub external_refund_id: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefundEntry {
    pub fn new(amount: Money, reason: impl Into<String>) -> Self {
        Self {
            id: RefundId::new_v7(),
            amount,
            reason: reason.into(),
            state: RefundState::Pending,
            external_refund_id: None,
            processed_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Last failure detail, cleared by a successful subsequent transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub code: String,
    pub message: String,
}

/// The canonical payment entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub purpose: Purpose,
    pub status: PaymentStatus,
    pub provider: ProviderRefs,
    pub billing: BillingDetails,
    pub attempts: Vec<StatusAttempt>,
    pub webhook_events: Vec<WebhookEventRecord>,
    pub refunds: Vec<RefundEntry>,
    pub failure: Option<PaymentFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Creates a new record in `Pending`, bound to the provider the payment
    /// method routes to
    pub fn new(
        user_id: UserId,
        amount: Money,
        method: PaymentMethod,
        purpose: Purpose,
        billing: BillingDetails,
    ) -> Self {
        let now = Utc::now();

        Self {
            id: PaymentId::new_v7(),
            user_id,
            amount,
            method,
            purpose,
            status: PaymentStatus::Pending,
            provider: ProviderRefs::new(method.provider()),
            billing,
            attempts: vec![StatusAttempt {
                status: PaymentStatus::Pending,
                occurred_at: now,
            }],
            webhook_events: Vec::new(),
            refunds: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a canonical status if it represents forward progress
    ///
    /// Returns true when the record advanced. A successful advance appends
    /// to the attempt log and clears any stored failure (unless the new
    /// status is itself `Failed`).
    pub fn apply_status(&mut self, status: PaymentStatus) -> bool {
        if !self.status.advances_to(status) {
            return false;
        }

        let now = Utc::now();
        self.status = status;
        self.attempts.push(StatusAttempt {
            status,
            occurred_at: now,
        });
        if status != PaymentStatus::Failed {
            self.failure = None;
        }
        self.updated_at = now;
        true
    }

    /// Applies `Failed` and stores the failure detail
    pub fn mark_failed(&mut self, code: impl Into<String>, message: impl Into<String>) -> bool {
        let advanced = self.apply_status(PaymentStatus::Failed);
        if advanced {
            self.failure = Some(PaymentFailure {
                code: code.into(),
                message: message.into(),
            });
        }
        advanced
    }

    /// Binds provider-side identifiers, never overwriting an existing one
    pub fn bind_provider(
        &mut self,
        external_payment_id: Option<&str>,
        tracking_key: Option<&str>,
        charge_id: Option<&str>,
    ) {
        if self.provider.external_payment_id.is_none() {
            self.provider.external_payment_id = external_payment_id.map(str::to_owned);
        }
        if self.provider.tracking_key.is_none() {
            self.provider.tracking_key = tracking_key.map(str::to_owned);
        }
        if self.provider.charge_id.is_none() {
            self.provider.charge_id = charge_id.map(str::to_owned);
        }
        self.updated_at = Utc::now();
    }

    /// Total of refunds that count against the balance (pending reservations
    /// included, so concurrent refunds cannot overshoot)
    pub fn reserved_refund_total(&self) -> Money {
        self.refunds
            .iter()
            .filter(|r| r.state != RefundState::Failed)
            .fold(Money::zero(self.amount.currency()), |acc, r| {
                acc.checked_add(&r.amount).unwrap_or(acc)
            })
    }

    /// Total of provider-accepted refunds
    pub fn completed_refund_total(&self) -> Money {
        self.refunds
            .iter()
            .filter(|r| r.state == RefundState::Completed)
            .fold(Money::zero(self.amount.currency()), |acc, r| {
                acc.checked_add(&r.amount).unwrap_or(acc)
            })
    }

    /// Amount still available to refund
    pub fn remaining_refundable(&self) -> Money {
        self.amount
            .checked_sub(&self.reserved_refund_total())
            .unwrap_or_else(|_| Money::zero(self.amount.currency()))
    }

    /// When the record first reached `Completed`, per the attempt log
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.attempts
            .iter()
            .find(|a| a.status == PaymentStatus::Completed)
            .map(|a| a.occurred_at)
    }
}
