//! Payment orchestration
//!
//! Receives create/confirm/poll/refund requests, selects the gateway by
//! payment method, persists and updates the Payment Record, and maps
//! gateway errors into the canonical taxonomy.
//!
//! A provider timeout is surfaced as retryable and never transitions the
//! record to `Failed`: its true state is unknown, so it is left as-is for a
//! later poll or webhook to resolve.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{error, info, warn};

use core_kernel::{Money, PaymentId, UserId};

use crate::billing::BillingDetails;
use crate::error::PaymentError;
use crate::method::{MethodDetails, PaymentMethod, ProviderName, Purpose};
use crate::ports::{
    GatewayError, IntentRequest, PaymentStore, ProviderGateway, RefundEntryData, StoreError,
};
use crate::record::{PaymentRecord, RefundEntry, RefundState};
use crate::status::PaymentStatus;
use crate::validation::validate_create;

/// Explicitly constructed set of gateway instances for this process
#[derive(Default)]
pub struct GatewayRegistry {
    gateways: HashMap<ProviderName, Arc<dyn ProviderGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, gateway: Arc<dyn ProviderGateway>) -> Self {
        self.gateways.insert(gateway.name(), gateway);
        self
    }

    pub fn get(&self, provider: ProviderName) -> Option<&Arc<dyn ProviderGateway>> {
        self.gateways.get(&provider)
    }
}

/// A create-payment request from an already-authenticated caller
#[derive(Debug, Clone)]
pub struct CreatePaymentRequest {
    pub user_id: UserId,
    pub amount: Money,
    pub method: PaymentMethod,
    pub purpose: Purpose,
    pub billing: BillingDetails,
}

/// What a caller needs to continue checkout after creation
#[derive(Debug, Clone)]
pub struct CreatedPayment {
    pub payment_id: PaymentId,
    pub client_secret: Option<String>,
    pub tracking_key: Option<String>,
}

/// The orchestration service
pub struct PaymentOrchestrator {
    store: Arc<dyn PaymentStore>,
    gateways: Arc<GatewayRegistry>,
}

impl PaymentOrchestrator {
    pub fn new(store: Arc<dyn PaymentStore>, gateways: Arc<GatewayRegistry>) -> Self {
        Self { store, gateways }
    }

    fn gateway_for(&self, provider: ProviderName) -> Result<Arc<dyn ProviderGateway>, PaymentError> {
        self.gateways.get(provider).cloned().ok_or_else(|| {
            error!(provider = %provider, "no gateway registered for provider");
            PaymentError::ProviderAuth(format!("no gateway registered for {provider}"))
        })
    }

    /// Creates a payment: validate, persist `Pending`, register the intent
    /// with the provider, advance to `Processing`
    ///
    /// On provider rejection the record is transitioned to `Failed` but
    /// retained; callers retry by creating a new record. On provider
    /// unavailability the record is left in `Pending` and the error is
    /// surfaced as retryable.
    pub async fn create(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<CreatedPayment, PaymentError> {
        validate_create(&request.amount, request.method, &request.billing)?;

        let gateway = self.gateway_for(request.method.provider())?;

        let record = PaymentRecord::new(
            request.user_id,
            request.amount,
            request.method,
            request.purpose,
            request.billing,
        );
        self.store.insert(&record).await?;

        info!(
            payment_id = %record.id,
            method = %record.method,
            provider = %record.provider.name,
            amount = %record.amount,
            "payment record created"
        );

        let intent_request = IntentRequest {
            payment_id: record.id,
            amount: record.amount,
            method: record.method,
            purpose: record.purpose.clone(),
            billing: record.billing.clone(),
        };

        match gateway.create_intent(&intent_request).await {
            Ok(intent) => {
                self.store
                    .bind_provider(
                        record.id,
                        Some(&intent.external_payment_id),
                        intent.tracking_key.as_deref(),
                        None,
                    )
                    .await?;
                self.store
                    .apply_status(record.id, PaymentStatus::Processing)
                    .await?;

                Ok(CreatedPayment {
                    payment_id: record.id,
                    client_secret: intent.client_secret,
                    tracking_key: intent.tracking_key,
                })
            }
            Err(GatewayError::Unavailable(message)) => {
                warn!(payment_id = %record.id, %message, "provider unavailable during create; record left pending");
                Err(PaymentError::ProviderUnavailable(message))
            }
            Err(GatewayError::Rejected { code, message }) => {
                self.store
                    .mark_failed(record.id, &code, &message)
                    .await?;
                Err(PaymentError::ProviderRejected { code, message })
            }
            Err(GatewayError::Auth(message)) => {
                error!(payment_id = %record.id, %message, "provider credentials rejected; check integration configuration");
                self.store
                    .mark_failed(record.id, "provider_auth", &message)
                    .await?;
                Err(PaymentError::ProviderAuth(message))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Confirms a payment and applies the resulting canonical status
    ///
    /// Confirming an already-completed payment is an idempotent success.
    pub async fn confirm(
        &self,
        id: PaymentId,
        details: MethodDetails,
    ) -> Result<PaymentRecord, PaymentError> {
        let record = self
            .store
            .fetch(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;

        match record.status {
            PaymentStatus::Completed => return Ok(record),
            PaymentStatus::Failed | PaymentStatus::Cancelled | PaymentStatus::Refunded => {
                return Err(PaymentError::AlreadyTerminal {
                    status: record.status,
                })
            }
            PaymentStatus::Pending | PaymentStatus::Processing => {}
        }

        let external_payment_id = record
            .provider
            .external_payment_id
            .clone()
            .ok_or_else(|| {
                PaymentError::InvalidState("payment has no provider intent bound".to_string())
            })?;

        let gateway = self.gateway_for(record.provider.name)?;

        match gateway.confirm(&external_payment_id, &details).await {
            Ok(confirmation) => {
                self.store
                    .bind_provider(id, None, None, Some(&confirmation.charge_id))
                    .await?;
                let write = self.store.apply_status(id, confirmation.status).await?;
                info!(
                    payment_id = %id,
                    raw_status = %confirmation.raw_status,
                    status = %write.record.status,
                    "payment confirmed"
                );
                Ok(write.record)
            }
            Err(GatewayError::Unavailable(message)) => {
                // True state unknown; leave the record for poll/webhook
                warn!(payment_id = %id, %message, "provider unavailable during confirm");
                Err(PaymentError::ProviderUnavailable(message))
            }
            Err(GatewayError::Rejected { code, message }) => {
                self.store.mark_failed(id, &code, &message).await?;
                Err(PaymentError::ProviderRejected { code, message })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Returns the current projection, reading through to the provider
    /// while the record is `Processing`
    ///
    /// Safe to call arbitrarily often; provider unavailability degrades to
    /// the stored projection.
    pub async fn poll(&self, id: PaymentId) -> Result<PaymentRecord, PaymentError> {
        let record = self
            .store
            .fetch(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;

        if record.status != PaymentStatus::Processing {
            return Ok(record);
        }

        let Some(external_payment_id) = record.provider.external_payment_id.clone() else {
            return Ok(record);
        };

        let gateway = self.gateway_for(record.provider.name)?;

        match gateway.get_status(&external_payment_id).await {
            Ok(status) => {
                let write = self.store.apply_status(id, status).await?;
                Ok(write.record)
            }
            Err(GatewayError::Auth(message)) => Err(PaymentError::ProviderAuth(message)),
            Err(error) => {
                warn!(payment_id = %id, %error, "status poll degraded to stored projection");
                Ok(record)
            }
        }
    }

    /// Refunds a completed payment, partially or in full
    ///
    /// The refund entry is reserved against the remaining balance before
    /// the provider call, which serializes concurrent refunds per record.
    /// A full refund moves the aggregate status to `Refunded`.
    pub async fn refund(
        &self,
        id: PaymentId,
        amount: Option<Money>,
        reason: &str,
    ) -> Result<RefundEntry, PaymentError> {
        let record = self
            .store
            .fetch(id)
            .await?
            .ok_or(PaymentError::NotFound(id))?;

        if record.status != PaymentStatus::Completed {
            return Err(PaymentError::NotRefundable(format!(
                "payment is {}, only completed payments can be refunded",
                record.status
            )));
        }
        if !record.method.supports_refunds() {
            return Err(PaymentError::NotRefundable(format!(
                "payment method {} does not support refunds",
                record.method
            )));
        }

        let gateway = self.gateway_for(record.provider.name)?;

        let completed_at = record.completed_at().ok_or_else(|| {
            PaymentError::InvalidState("completed payment has no completion attempt".to_string())
        })?;
        if Utc::now() - completed_at > Duration::days(gateway.refund_window_days()) {
            return Err(PaymentError::NotRefundable(format!(
                "outside the {}-day provider refund window",
                gateway.refund_window_days()
            )));
        }

        let charge_id = record
            .provider
            .charge_id
            .clone()
            .or_else(|| record.provider.external_payment_id.clone())
            .ok_or_else(|| {
                PaymentError::InvalidState("payment has no provider charge bound".to_string())
            })?;

        let amount = amount.unwrap_or(record.amount);
        if !amount.is_positive() || amount.currency() != record.amount.currency() {
            return Err(PaymentError::NotRefundable(
                "refund amount must be positive and in the payment currency".to_string(),
            ));
        }

        let reservation = RefundEntryData {
            id: core_kernel::RefundId::new_v7(),
            amount,
            reason: reason.to_string(),
            created_at: Utc::now(),
        };
        match self.store.reserve_refund(id, &reservation).await {
            Ok(()) => {}
            Err(StoreError::RefundExceedsBalance) => {
                return Err(PaymentError::NotRefundable(
                    "refund exceeds the remaining refundable balance".to_string(),
                ))
            }
            Err(error) => return Err(error.into()),
        }

        match gateway.refund(&charge_id, amount, reason).await {
            Ok(outcome) => {
                let processed_at = Utc::now();
                self.store
                    .settle_refund(
                        id,
                        reservation.id,
                        outcome.state,
                        Some(&outcome.external_refund_id),
                        Some(processed_at),
                    )
                    .await?;

                if outcome.state == RefundState::Completed {
                    let record = self
                        .store
                        .fetch(id)
                        .await?
                        .ok_or(PaymentError::NotFound(id))?;
                    if record.completed_refund_total() == record.amount {
                        self.store.apply_status(id, PaymentStatus::Refunded).await?;
                    }
                }

                info!(
                    payment_id = %id,
                    refund_id = %reservation.id,
                    amount = %amount,
                    state = ?outcome.state,
                    "refund processed"
                );

                Ok(RefundEntry {
                    id: reservation.id,
                    amount,
                    reason: reservation.reason,
                    state: outcome.state,
                    external_refund_id: Some(outcome.external_refund_id),
                    processed_at: Some(processed_at),
                    created_at: reservation.created_at,
                })
            }
            Err(GatewayError::Unavailable(message)) => {
                // Outcome unknown; the reservation stays pending so the
                // balance invariant holds even if the provider processed it
                warn!(payment_id = %id, refund_id = %reservation.id, %message, "provider unavailable during refund; reservation kept");
                Err(PaymentError::ProviderUnavailable(message))
            }
            Err(error) => {
                self.store
                    .settle_refund(id, reservation.id, RefundState::Failed, None, None)
                    .await?;
                Err(error.into())
            }
        }
    }
}
