//! A programmable provider gateway for orchestration tests
//!
//! Responses are scripted per test; webhook verification compares the
//! `x-test-signature` header against the configured secret, and webhook
//! bodies use a small JSON shape that mirrors what real adapters decode.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;

use core_kernel::Money;
use domain_payments::{
    Confirmation, CorrelationKey, CreatedIntent, GatewayError, IntentRequest, MethodDetails,
    PaymentStatus, ProviderEvent, ProviderGateway, ProviderName, RefundOutcome, RefundState,
};

/// Scripted gateway with per-operation programmable responses
pub struct ScriptedGateway {
    name: ProviderName,
    webhook_secret: String,
    refund_window_days: i64,
    create: Mutex<Result<CreatedIntent, GatewayError>>,
    confirm: Mutex<Result<Confirmation, GatewayError>>,
    status: Mutex<Result<PaymentStatus, GatewayError>>,
    refund: Mutex<Result<RefundOutcome, GatewayError>>,
}

impl ScriptedGateway {
    /// A gateway for the given provider with successful defaults
    pub fn for_provider(name: ProviderName) -> Self {
        Self {
            name,
            webhook_secret: "test-webhook-secret".to_string(),
            refund_window_days: 180,
            create: Mutex::new(Ok(CreatedIntent {
                external_payment_id: "EXT1".to_string(),
                tracking_key: Some("TRK1".to_string()),
                client_secret: Some("secret_1".to_string()),
            })),
            confirm: Mutex::new(Ok(Confirmation {
                charge_id: "chg_1".to_string(),
                raw_status: "pending_payment".to_string(),
                status: PaymentStatus::Processing,
            })),
            status: Mutex::new(Ok(PaymentStatus::Processing)),
            refund: Mutex::new(Ok(RefundOutcome {
                external_refund_id: "ref_ext_1".to_string(),
                state: RefundState::Completed,
            })),
        }
    }

    pub fn conekta() -> Self {
        Self::for_provider(ProviderName::Conekta)
    }

    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    pub fn script_create(&self, result: Result<CreatedIntent, GatewayError>) {
        *self.create.lock().unwrap() = result;
    }

    pub fn script_confirm(&self, result: Result<Confirmation, GatewayError>) {
        *self.confirm.lock().unwrap() = result;
    }

    pub fn script_status(&self, result: Result<PaymentStatus, GatewayError>) {
        *self.status.lock().unwrap() = result;
    }

    pub fn script_refund(&self, result: Result<RefundOutcome, GatewayError>) {
        *self.refund.lock().unwrap() = result;
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    fn name(&self) -> ProviderName {
        self.name
    }

    fn refund_window_days(&self) -> i64 {
        self.refund_window_days
    }

    async fn create_intent(&self, _request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        self.create.lock().unwrap().clone()
    }

    async fn confirm(
        &self,
        _external_payment_id: &str,
        _details: &MethodDetails,
    ) -> Result<Confirmation, GatewayError> {
        self.confirm.lock().unwrap().clone()
    }

    async fn get_status(&self, _external_payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        self.status.lock().unwrap().clone()
    }

    async fn refund(
        &self,
        _charge_id: &str,
        _amount: Money,
        _reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        self.refund.lock().unwrap().clone()
    }

    fn verify_webhook_signature(&self, headers: &http::HeaderMap, _raw_body: &[u8]) -> bool {
        headers
            .get("x-test-signature")
            .and_then(|v| v.to_str().ok())
            .map(|v| v == self.webhook_secret)
            .unwrap_or(false)
    }

    fn interpret_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, GatewayError> {
        let event: ScriptedEvent = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let status = PaymentStatus::parse(&event.status).unwrap_or(PaymentStatus::Processing);
        Ok(ProviderEvent {
            event_type: event.event_type,
            correlation: event.correlation,
            status,
            charge_id: event.charge_id,
            payload: serde_json::from_slice(raw_body)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?,
        })
    }
}

/// The JSON shape scripted webhook bodies use
#[derive(Debug, Deserialize)]
struct ScriptedEvent {
    #[serde(rename = "type")]
    event_type: String,
    status: String,
    correlation: CorrelationKey,
    charge_id: Option<String>,
}

/// Builds a scripted webhook body
pub fn webhook_body(
    event_type: &str,
    status: PaymentStatus,
    correlation: &CorrelationKey,
    charge_id: Option<&str>,
) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "type": event_type,
        "status": status.as_str(),
        "correlation": correlation,
        "charge_id": charge_id,
    }))
    .expect("webhook body serializes")
}
