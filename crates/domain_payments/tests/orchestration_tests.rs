//! Orchestration and reconciliation tests
//!
//! These exercise the create/confirm/poll/refund flows and webhook
//! reconciliation against the in-memory store with a scripted gateway.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal_macros::dec;

use core_kernel::{Currency, Money, UserId};
use domain_payments::{
    BillingDetails, Confirmation, CorrelationKey, CreatePaymentRequest, CreatedIntent,
    GatewayError, GatewayRegistry, InMemoryPaymentStore, IntentRequest, MethodDetails,
    PaymentError, PaymentMethod, PaymentOrchestrator, PaymentStatus, PaymentStore, ProviderEvent,
    ProviderGateway, ProviderName, Purpose, RefundOutcome, RefundState, WebhookDisposition,
    WebhookReconciler,
};

/// A gateway whose responses are scripted per test
struct ScriptedGateway {
    name: ProviderName,
    create_error: Option<GatewayError>,
    confirm_error: Option<GatewayError>,
    confirm_status: PaymentStatus,
    poll_status: Mutex<PaymentStatus>,
    refund_error: Option<GatewayError>,
}

impl ScriptedGateway {
    fn conekta() -> Self {
        Self {
            name: ProviderName::Conekta,
            create_error: None,
            confirm_error: None,
            confirm_status: PaymentStatus::Processing,
            poll_status: Mutex::new(PaymentStatus::Processing),
            refund_error: None,
        }
    }

    fn with_create_error(mut self, error: GatewayError) -> Self {
        self.create_error = Some(error);
        self
    }

    fn with_confirm_error(mut self, error: GatewayError) -> Self {
        self.confirm_error = Some(error);
        self
    }

    fn with_confirm_status(mut self, status: PaymentStatus) -> Self {
        self.confirm_status = status;
        self
    }

    fn with_refund_error(mut self, error: GatewayError) -> Self {
        self.refund_error = Some(error);
        self
    }

    fn set_poll_status(&self, status: PaymentStatus) {
        *self.poll_status.lock().unwrap() = status;
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    fn name(&self) -> ProviderName {
        self.name
    }

    fn refund_window_days(&self) -> i64 {
        180
    }

    async fn create_intent(&self, _request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        if let Some(error) = &self.create_error {
            return Err(error.clone());
        }
        Ok(CreatedIntent {
            external_payment_id: "EXT1".to_string(),
            tracking_key: Some("TRK1".to_string()),
            client_secret: Some("secret_1".to_string()),
        })
    }

    async fn confirm(
        &self,
        external_payment_id: &str,
        _details: &MethodDetails,
    ) -> Result<Confirmation, GatewayError> {
        if let Some(error) = &self.confirm_error {
            return Err(error.clone());
        }
        Ok(Confirmation {
            charge_id: format!("chg_{external_payment_id}"),
            raw_status: "pending_payment".to_string(),
            status: self.confirm_status,
        })
    }

    async fn get_status(&self, _external_payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        Ok(*self.poll_status.lock().unwrap())
    }

    async fn refund(
        &self,
        _charge_id: &str,
        _amount: Money,
        _reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        if let Some(error) = &self.refund_error {
            return Err(error.clone());
        }
        Ok(RefundOutcome {
            external_refund_id: "ref_ext_1".to_string(),
            state: RefundState::Completed,
        })
    }

    fn verify_webhook_signature(&self, headers: &http::HeaderMap, _raw_body: &[u8]) -> bool {
        headers
            .get("x-test-signature")
            .map(|v| v == "valid")
            .unwrap_or(false)
    }

    fn interpret_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, GatewayError> {
        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let event_type = payload["type"].as_str().unwrap_or("unknown").to_string();
        let order_id = payload["order_id"]
            .as_str()
            .ok_or_else(|| GatewayError::Malformed("missing order_id".to_string()))?
            .to_string();
        let status = match event_type.as_str() {
            "charge.paid" => PaymentStatus::Completed,
            "charge.declined" => PaymentStatus::Failed,
            "order.expired" => PaymentStatus::Cancelled,
            "charge.pending" => PaymentStatus::Processing,
            _ => PaymentStatus::Processing,
        };
        Ok(ProviderEvent {
            event_type,
            correlation: CorrelationKey::ExternalPaymentId(order_id),
            status,
            charge_id: payload["charge_id"].as_str().map(str::to_owned),
            payload,
        })
    }
}

struct Harness {
    store: Arc<InMemoryPaymentStore>,
    orchestrator: PaymentOrchestrator,
    reconciler: WebhookReconciler,
}

fn harness(gateway: ScriptedGateway) -> Harness {
    let store = Arc::new(InMemoryPaymentStore::new());
    let registry = Arc::new(GatewayRegistry::new().register(Arc::new(gateway)));
    Harness {
        store: store.clone(),
        orchestrator: PaymentOrchestrator::new(store.clone(), registry.clone()),
        reconciler: WebhookReconciler::new(store, registry),
    }
}

fn card_request() -> CreatePaymentRequest {
    CreatePaymentRequest {
        user_id: UserId::new(),
        amount: Money::new(dec!(1000), Currency::MXN),
        method: PaymentMethod::Card,
        purpose: Purpose::new("course", "rust-101"),
        billing: BillingDetails::new("Ana Torres", "ana@example.com"),
    }
}

fn valid_headers() -> http::HeaderMap {
    let mut headers = http::HeaderMap::new();
    headers.insert("x-test-signature", "valid".parse().unwrap());
    headers
}

mod create {
    use super::*;

    #[tokio::test]
    async fn creates_exactly_one_processing_record() {
        let h = harness(ScriptedGateway::conekta());

        let created = h.orchestrator.create(card_request()).await.unwrap();

        assert_eq!(h.store.len().await, 1);
        let record = h.store.fetch(created.payment_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Processing);
        assert_eq!(record.provider.external_payment_id.as_deref(), Some("EXT1"));
        assert_eq!(created.client_secret.as_deref(), Some("secret_1"));
        assert_eq!(created.tracking_key.as_deref(), Some("TRK1"));
    }

    #[tokio::test]
    async fn validation_failure_persists_nothing() {
        let h = harness(ScriptedGateway::conekta());
        let mut request = card_request();
        request.amount = Money::zero(Currency::MXN);

        let error = h.orchestrator.create(request).await.unwrap_err();
        assert!(matches!(error, PaymentError::Validation(_)));
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn provider_rejection_fails_record_but_retains_it() {
        let h = harness(ScriptedGateway::conekta().with_create_error(
            GatewayError::Rejected {
                code: "card_declined".into(),
                message: "insufficient funds".into(),
            },
        ));

        let error = h.orchestrator.create(card_request()).await.unwrap_err();
        assert!(matches!(error, PaymentError::ProviderRejected { .. }));

        // The failed record is retained for audit with its failure detail
        let records = h.store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PaymentStatus::Failed);
        let failure = records[0].failure.as_ref().unwrap();
        assert_eq!(failure.code, "card_declined");
    }

    #[tokio::test]
    async fn provider_unavailable_leaves_record_pending() {
        let h = harness(
            ScriptedGateway::conekta()
                .with_create_error(GatewayError::Unavailable("connect timeout".into())),
        );

        let error = h.orchestrator.create(card_request()).await.unwrap_err();
        assert!(error.is_retryable());

        let records = h.store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, PaymentStatus::Pending);
        assert!(records[0].failure.is_none());
    }
}

mod confirm {
    use super::*;

    #[tokio::test]
    async fn confirm_applies_canonical_status() {
        let h = harness(
            ScriptedGateway::conekta().with_confirm_status(PaymentStatus::Completed),
        );
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let record = h
            .orchestrator
            .confirm(created.payment_id, MethodDetails::CardToken {
                token: "tok_1".into(),
            })
            .await
            .unwrap();

        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.provider.charge_id.as_deref(), Some("chg_EXT1"));
    }

    #[tokio::test]
    async fn confirm_on_completed_is_idempotent_success() {
        let h = harness(
            ScriptedGateway::conekta().with_confirm_status(PaymentStatus::Completed),
        );
        let created = h.orchestrator.create(card_request()).await.unwrap();
        h.orchestrator
            .confirm(created.payment_id, MethodDetails::None)
            .await
            .unwrap();

        let record = h
            .orchestrator
            .confirm(created.payment_id, MethodDetails::None)
            .await
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn confirm_on_failed_is_already_terminal() {
        let h = harness(ScriptedGateway::conekta());
        let created = h.orchestrator.create(card_request()).await.unwrap();
        h.store
            .mark_failed(created.payment_id, "card_declined", "declined")
            .await
            .unwrap();

        let error = h
            .orchestrator
            .confirm(created.payment_id, MethodDetails::None)
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            PaymentError::AlreadyTerminal {
                status: PaymentStatus::Failed
            }
        ));
    }

    #[tokio::test]
    async fn confirm_timeout_leaves_record_processing() {
        let h = harness(
            ScriptedGateway::conekta()
                .with_confirm_error(GatewayError::Unavailable("read timeout".into())),
        );
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let error = h
            .orchestrator
            .confirm(created.payment_id, MethodDetails::None)
            .await
            .unwrap_err();
        assert!(error.is_retryable());

        let record = h.store.fetch(created.payment_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn confirm_unknown_payment_is_not_found() {
        let h = harness(ScriptedGateway::conekta());
        let error = h
            .orchestrator
            .confirm(core_kernel::PaymentId::new(), MethodDetails::None)
            .await
            .unwrap_err();
        assert!(matches!(error, PaymentError::NotFound(_)));
    }
}

mod poll {
    use super::*;

    #[tokio::test]
    async fn poll_resolves_processing_to_completed() {
        let gateway = ScriptedGateway::conekta();
        gateway.set_poll_status(PaymentStatus::Completed);
        let h = harness(gateway);
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let record = h.orchestrator.poll(created.payment_id).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn poll_is_a_noop_once_terminal() {
        let gateway = ScriptedGateway::conekta();
        gateway.set_poll_status(PaymentStatus::Failed);
        let h = harness(gateway);
        let created = h.orchestrator.create(card_request()).await.unwrap();
        h.store
            .apply_status(created.payment_id, PaymentStatus::Completed)
            .await
            .unwrap();

        // The stale "failed" from the provider must not regress the record
        let record = h.orchestrator.poll(created.payment_id).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
    }
}

mod webhooks {
    use super::*;

    fn paid_event_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": "charge.paid",
            "order_id": "EXT1",
            "charge_id": "chg_hook",
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn happy_path_webhook_completes_payment() {
        let h = harness(ScriptedGateway::conekta());
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let ack = h
            .reconciler
            .ingest(ProviderName::Conekta, &valid_headers(), &paid_event_body())
            .await
            .unwrap();

        assert_eq!(
            ack.disposition,
            WebhookDisposition::Applied(PaymentStatus::Completed)
        );
        let record = h.store.fetch(created.payment_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.webhook_events.len(), 1);
        assert_eq!(record.provider.charge_id.as_deref(), Some("chg_hook"));
    }

    #[tokio::test]
    async fn duplicate_delivery_records_twice_applies_once() {
        let h = harness(ScriptedGateway::conekta());
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let first = h
            .reconciler
            .ingest(ProviderName::Conekta, &valid_headers(), &paid_event_body())
            .await
            .unwrap();
        let second = h
            .reconciler
            .ingest(ProviderName::Conekta, &valid_headers(), &paid_event_body())
            .await
            .unwrap();

        assert_eq!(
            first.disposition,
            WebhookDisposition::Applied(PaymentStatus::Completed)
        );
        assert_eq!(second.disposition, WebhookDisposition::Stale);

        let record = h.store.fetch(created.payment_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.webhook_events.len(), 2);
        // Exactly one effective status change past processing
        let completed_attempts = record
            .attempts
            .iter()
            .filter(|a| a.status == PaymentStatus::Completed)
            .count();
        assert_eq!(completed_attempts, 1);
    }

    #[tokio::test]
    async fn stale_webhook_does_not_regress_completed() {
        let h = harness(ScriptedGateway::conekta());
        let created = h.orchestrator.create(card_request()).await.unwrap();
        h.store
            .apply_status(created.payment_id, PaymentStatus::Completed)
            .await
            .unwrap();

        let body = serde_json::to_vec(&serde_json::json!({
            "type": "charge.pending",
            "order_id": "EXT1",
        }))
        .unwrap();
        let ack = h
            .reconciler
            .ingest(ProviderName::Conekta, &valid_headers(), &body)
            .await
            .unwrap();

        assert_eq!(ack.disposition, WebhookDisposition::Stale);
        let record = h.store.fetch(created.payment_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        // The stale event is still recorded for forensics
        assert_eq!(record.webhook_events.len(), 1);
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected_and_nothing_recorded() {
        let h = harness(ScriptedGateway::conekta());
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let mut headers = http::HeaderMap::new();
        headers.insert("x-test-signature", "tampered".parse().unwrap());
        let error = h
            .reconciler
            .ingest(ProviderName::Conekta, &headers, &paid_event_body())
            .await
            .unwrap_err();

        assert!(matches!(error, PaymentError::InvalidSignature));
        let record = h.store.fetch(created.payment_id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Processing);
        assert!(record.webhook_events.is_empty());
    }

    #[tokio::test]
    async fn unmatched_webhook_is_acknowledged() {
        let h = harness(ScriptedGateway::conekta());

        let body = serde_json::to_vec(&serde_json::json!({
            "type": "charge.paid",
            "order_id": "SOMEONE_ELSES_ORDER",
        }))
        .unwrap();
        let ack = h
            .reconciler
            .ingest(ProviderName::Conekta, &valid_headers(), &body)
            .await
            .unwrap();

        assert_eq!(ack.disposition, WebhookDisposition::Unmatched);
    }

    #[tokio::test]
    async fn unknown_event_type_defaults_to_processing() {
        let h = harness(ScriptedGateway::conekta());
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let body = serde_json::to_vec(&serde_json::json!({
            "type": "charge.under_review",
            "order_id": "EXT1",
        }))
        .unwrap();
        let ack = h
            .reconciler
            .ingest(ProviderName::Conekta, &valid_headers(), &body)
            .await
            .unwrap();

        // Already processing, so the defaulted status is stale but recorded
        assert_eq!(ack.disposition, WebhookDisposition::Stale);
        let record = h.store.fetch(created.payment_id).await.unwrap().unwrap();
        assert_eq!(record.webhook_events.len(), 1);
    }
}

mod refunds {
    use super::*;

    async fn completed_payment(h: &Harness) -> core_kernel::PaymentId {
        let created = h.orchestrator.create(card_request()).await.unwrap();
        h.store
            .bind_provider(created.payment_id, None, None, Some("chg_1"))
            .await
            .unwrap();
        h.store
            .apply_status(created.payment_id, PaymentStatus::Completed)
            .await
            .unwrap();
        created.payment_id
    }

    #[tokio::test]
    async fn partial_refund_keeps_completed_status() {
        let h = harness(ScriptedGateway::conekta());
        let id = completed_payment(&h).await;

        let entry = h
            .orchestrator
            .refund(id, Some(Money::new(dec!(400), Currency::MXN)), "requested")
            .await
            .unwrap();

        assert_eq!(entry.state, RefundState::Completed);
        let record = h.store.fetch(id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Completed);
        assert_eq!(record.completed_refund_total().amount(), dec!(400));
    }

    #[tokio::test]
    async fn full_refund_moves_aggregate_to_refunded() {
        let h = harness(ScriptedGateway::conekta());
        let id = completed_payment(&h).await;

        h.orchestrator.refund(id, None, "full refund").await.unwrap();

        let record = h.store.fetch(id).await.unwrap().unwrap();
        assert_eq!(record.status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn refund_beyond_balance_is_not_refundable() {
        let h = harness(ScriptedGateway::conekta());
        let id = completed_payment(&h).await;

        h.orchestrator
            .refund(id, Some(Money::new(dec!(800), Currency::MXN)), "first")
            .await
            .unwrap();
        let error = h
            .orchestrator
            .refund(id, Some(Money::new(dec!(300), Currency::MXN)), "second")
            .await
            .unwrap_err();

        assert!(matches!(error, PaymentError::NotRefundable(_)));
        let record = h.store.fetch(id).await.unwrap().unwrap();
        assert_eq!(record.completed_refund_total().amount(), dec!(800));
    }

    #[tokio::test]
    async fn refund_requires_completed_status() {
        let h = harness(ScriptedGateway::conekta());
        let created = h.orchestrator.create(card_request()).await.unwrap();

        let error = h
            .orchestrator
            .refund(created.payment_id, None, "too early")
            .await
            .unwrap_err();
        assert!(matches!(error, PaymentError::NotRefundable(_)));
    }

    #[tokio::test]
    async fn provider_rejection_marks_reservation_failed() {
        let h = harness(
            ScriptedGateway::conekta()
                .with_refund_error(GatewayError::NotRefundable("window elapsed".into())),
        );
        let id = completed_payment(&h).await;

        let error = h.orchestrator.refund(id, None, "late").await.unwrap_err();
        assert!(matches!(error, PaymentError::NotRefundable(_)));

        // The failed reservation releases the balance
        let record = h.store.fetch(id).await.unwrap().unwrap();
        assert_eq!(record.refunds.len(), 1);
        assert_eq!(record.refunds[0].state, RefundState::Failed);
        assert_eq!(record.remaining_refundable(), record.amount);
    }
}
