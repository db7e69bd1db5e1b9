//! Wallet checkout gateway
//!
//! A checkout preference is created at intent time; the wallet redirect
//! returns an authorization code that confirmation exchanges for a payment.
//! Webhooks are signed with an `x-signature` header of the form
//! `ts=<unix>,v1=<hex hmac>` over `<ts>.<raw body>`, verified in constant
//! time with a replay window.

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use domain_payments::{
    Confirmation, CorrelationKey, CreatedIntent, GatewayError, IntentRequest, MethodDetails,
    PaymentStatus, ProviderEvent, ProviderGateway, ProviderName, RefundOutcome, RefundState,
};

use crate::http::{response_error, transport_error};
use crate::signature::verify_hmac_hex;

const PROVIDER: &str = "mercado_pago";

/// Maximum age for webhook deliveries (replay protection)
const MAX_SIGNATURE_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

/// Configuration for the wallet checkout processor
#[derive(Clone)]
pub struct MercadoPagoConfig {
    pub access_token: SecretString,
    pub webhook_secret: SecretString,
    pub base_url: String,
    pub timeout: Duration,
    pub refund_window_days: i64,
}

impl MercadoPagoConfig {
    pub fn new(access_token: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::new(access_token.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            base_url: "https://api.mercadopago.com".to_string(),
            timeout: Duration::from_secs(10),
            refund_window_days: 90,
        }
    }

    /// Overrides the API base URL (for testing)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Gateway for the wallet checkout processor
pub struct MercadoPagoGateway {
    config: MercadoPagoConfig,
    client: reqwest::Client,
}

impl MercadoPagoGateway {
    pub fn new(config: MercadoPagoConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.base_url, path))
            .bearer_auth(self.config.access_token.expose_secret())
            .timeout(self.config.timeout)
    }
}

/// Maps the wallet processor's payment status vocabulary into the canonical
/// set; unknown values default to `Processing`
fn map_payment_status(raw: &str) -> PaymentStatus {
    match raw {
        "pending" | "in_process" | "in_mediation" | "authorized" => PaymentStatus::Processing,
        "approved" | "accredited" => PaymentStatus::Completed,
        "rejected" => PaymentStatus::Failed,
        "cancelled" | "expired" => PaymentStatus::Cancelled,
        "refunded" | "charged_back" => PaymentStatus::Refunded,
        other => {
            debug!(provider = PROVIDER, raw = other, "unmapped payment status, defaulting to processing");
            PaymentStatus::Processing
        }
    }
}

#[async_trait]
impl ProviderGateway for MercadoPagoGateway {
    fn name(&self) -> ProviderName {
        ProviderName::MercadoPago
    }

    fn refund_window_days(&self) -> i64 {
        self.config.refund_window_days
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        let body = json!({
            "items": [{
                "id": request.purpose.item_id,
                "title": request.purpose.kind,
                "quantity": 1,
                "unit_price": request.amount.amount(),
                "currency_id": request.amount.currency().code(),
            }],
            "external_reference": request.payment_id.to_string(),
            "payer": {
                "name": request.billing.name,
                "email": request.billing.email,
            },
        });

        let response = self
            .request(reqwest::Method::POST, "/checkout/preferences")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let preference: PreferenceResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(CreatedIntent {
            external_payment_id: preference.id,
            tracking_key: None,
            // The init point is the URL the client opens to complete checkout
            client_secret: preference.init_point,
        })
    }

    async fn confirm(
        &self,
        external_payment_id: &str,
        details: &MethodDetails,
    ) -> Result<Confirmation, GatewayError> {
        let authorization_code = match details {
            MethodDetails::WalletAuthorization { authorization_code } => authorization_code,
            _ => {
                return Err(GatewayError::Rejected {
                    code: "missing_authorization".to_string(),
                    message: "wallet confirmation requires the checkout authorization code"
                        .to_string(),
                })
            }
        };

        // The idempotency key ties retried confirmations to the same
        // wallet payment
        let response = self
            .request(reqwest::Method::POST, "/v1/payments")
            .header("X-Idempotency-Key", external_payment_id)
            .json(&json!({
                "preference_id": external_payment_id,
                "token": authorization_code,
            }))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let payment: PaymentResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let raw = payment.status.unwrap_or_default();
        Ok(Confirmation {
            charge_id: payment.id.to_string(),
            status: map_payment_status(&raw),
            raw_status: raw,
        })
    }

    async fn get_status(&self, external_payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/payments/search?preference_id={external_payment_id}"),
            )
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let search: PaymentSearchResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        // No payment yet means the payer has not finished checkout
        let Some(payment) = search.results.first() else {
            return Ok(PaymentStatus::Processing);
        };
        Ok(map_payment_status(payment.status.as_deref().unwrap_or("")))
    }

    async fn refund(
        &self,
        charge_id: &str,
        amount: core_kernel::Money,
        reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/v1/payments/{charge_id}/refunds"),
            )
            .json(&json!({
                "amount": amount.amount(),
                "metadata": { "reason": reason },
            }))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            let error = response_error(PROVIDER, response).await;
            return Err(GatewayError::NotRefundable(error.to_string()));
        }
        if !status.is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let refund: RefundResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(RefundOutcome {
            external_refund_id: refund.id.to_string(),
            state: match refund.status.as_deref() {
                Some("in_process") | Some("pending") => RefundState::Pending,
                _ => RefundState::Completed,
            },
        })
    }

    fn verify_webhook_signature(&self, headers: &http::HeaderMap, raw_body: &[u8]) -> bool {
        let Some(header) = headers.get("x-signature").and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let Some((ts, v1)) = parse_signature_header(header) else {
            return false;
        };

        // Replay protection: stale or future-dated deliveries are rejected
        let age = Utc::now().timestamp() - ts;
        if age > MAX_SIGNATURE_AGE_SECS || age < -MAX_FUTURE_TOLERANCE_SECS {
            warn!(provider = PROVIDER, age_secs = age, "webhook signature timestamp outside window");
            return false;
        }

        let mut manifest = Vec::with_capacity(raw_body.len() + 16);
        manifest.extend_from_slice(ts.to_string().as_bytes());
        manifest.push(b'.');
        manifest.extend_from_slice(raw_body);

        verify_hmac_hex(
            self.config.webhook_secret.expose_secret().as_bytes(),
            &manifest,
            &v1,
        )
    }

    fn interpret_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, GatewayError> {
        let event: WebhookNotification = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let status = map_payment_status(event.data.status.as_deref().unwrap_or(""));
        Ok(ProviderEvent {
            event_type: event.action,
            correlation: CorrelationKey::ChargeId(event.data.id.clone()),
            status,
            charge_id: Some(event.data.id),
            payload: serde_json::from_slice(raw_body)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?,
        })
    }
}

/// Parses `ts=<unix>,v1=<hex>` (order-insensitive, whitespace-tolerant)
fn parse_signature_header(header: &str) -> Option<(i64, String)> {
    let mut ts = None;
    let mut v1 = None;
    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key.trim() {
            "ts" => ts = value.trim().parse::<i64>().ok(),
            "v1" => v1 = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Some((ts?, v1?))
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    init_point: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: u64,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaymentSearchResponse {
    results: Vec<PaymentResponse>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: u64,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookNotification {
    action: String,
    data: WebhookPaymentData,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentData {
    id: String,
    status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{hex_encode, hmac_sha256};

    fn gateway() -> MercadoPagoGateway {
        MercadoPagoGateway::new(MercadoPagoConfig::new("token_test", "mp_secret"))
    }

    fn sign(body: &[u8], ts: i64, secret: &[u8]) -> String {
        let mut manifest = ts.to_string().into_bytes();
        manifest.push(b'.');
        manifest.extend_from_slice(body);
        format!("ts={ts},v1={}", hex_encode(&hmac_sha256(secret, &manifest)))
    }

    #[test]
    fn test_status_mapping_is_total() {
        assert_eq!(map_payment_status("approved"), PaymentStatus::Completed);
        assert_eq!(map_payment_status("pending"), PaymentStatus::Processing);
        assert_eq!(map_payment_status("in_process"), PaymentStatus::Processing);
        assert_eq!(map_payment_status("rejected"), PaymentStatus::Failed);
        assert_eq!(map_payment_status("cancelled"), PaymentStatus::Cancelled);
        assert_eq!(map_payment_status("charged_back"), PaymentStatus::Refunded);
        assert_eq!(map_payment_status("something_new"), PaymentStatus::Processing);
    }

    #[test]
    fn test_signature_round_trip() {
        let gw = gateway();
        let body = br#"{"action":"payment.updated","data":{"id":"42","status":"approved"}}"#;
        let header = sign(body, Utc::now().timestamp(), b"mp_secret");

        let mut headers = http::HeaderMap::new();
        headers.insert("x-signature", header.parse().unwrap());
        assert!(gw.verify_webhook_signature(&headers, body));
    }

    #[test]
    fn test_signature_rejects_tampered_body() {
        let gw = gateway();
        let header = sign(b"original", Utc::now().timestamp(), b"mp_secret");

        let mut headers = http::HeaderMap::new();
        headers.insert("x-signature", header.parse().unwrap());
        assert!(!gw.verify_webhook_signature(&headers, b"tampered"));
    }

    #[test]
    fn test_signature_rejects_stale_timestamp() {
        let gw = gateway();
        let body = b"payload";
        let stale = Utc::now().timestamp() - MAX_SIGNATURE_AGE_SECS - 10;
        let header = sign(body, stale, b"mp_secret");

        let mut headers = http::HeaderMap::new();
        headers.insert("x-signature", header.parse().unwrap());
        assert!(!gw.verify_webhook_signature(&headers, body));
    }

    #[test]
    fn test_signature_header_parsing() {
        assert_eq!(
            parse_signature_header("ts=170000, v1=abcd"),
            Some((170000, "abcd".to_string()))
        );
        assert_eq!(
            parse_signature_header("v1=abcd,ts=170000"),
            Some((170000, "abcd".to_string()))
        );
        assert_eq!(parse_signature_header("ts=170000"), None);
        assert_eq!(parse_signature_header("garbage"), None);
    }

    #[test]
    fn test_interpret_webhook_correlates_by_charge() {
        let gw = gateway();
        let body = br#"{"action":"payment.updated","data":{"id":"42","status":"approved"}}"#;

        let event = gw.interpret_webhook(body).unwrap();
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.correlation, CorrelationKey::ChargeId("42".to_string()));
        assert_eq!(event.charge_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_interpret_webhook_without_status_defaults_to_processing() {
        let gw = gateway();
        let body = br#"{"action":"payment.created","data":{"id":"42"}}"#;

        let event = gw.interpret_webhook(body).unwrap();
        assert_eq!(event.status, PaymentStatus::Processing);
    }
}
