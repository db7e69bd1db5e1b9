//! Card and cash-voucher processor gateway
//!
//! Orders are created at intent time; card charges are attached at
//! confirmation with a client-side token, cash-voucher charges are created
//! up front so the payer gets a store reference immediately. Webhooks carry
//! an HMAC-SHA256 hex signature of the raw body in the `digest` header.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use domain_payments::{
    Confirmation, CorrelationKey, CreatedIntent, GatewayError, IntentRequest, MethodDetails,
    PaymentMethod, PaymentStatus, ProviderEvent, ProviderGateway, ProviderName, RefundOutcome,
    RefundState,
};

use crate::http::{response_error, transport_error};
use crate::signature::verify_hmac_hex;

const PROVIDER: &str = "conekta";
const API_VERSION: &str = "application/vnd.conekta-v2.1.0+json";

/// Configuration for the card/voucher processor
#[derive(Clone)]
pub struct ConektaConfig {
    pub api_key: SecretString,
    pub webhook_secret: SecretString,
    pub base_url: String,
    pub timeout: Duration,
    pub refund_window_days: i64,
}

impl ConektaConfig {
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            base_url: "https://api.conekta.io".to_string(),
            timeout: Duration::from_secs(10),
            refund_window_days: 180,
        }
    }

    /// Overrides the API base URL (for testing)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Gateway for the card and cash-voucher processor
pub struct ConektaGateway {
    config: ConektaConfig,
    client: reqwest::Client,
}

impl ConektaGateway {
    pub fn new(config: ConektaConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.config.base_url, path))
            .basic_auth(self.config.api_key.expose_secret(), None::<&str>)
            .header(reqwest::header::ACCEPT, API_VERSION)
            .timeout(self.config.timeout)
    }

    async fn fetch_order(&self, order_id: &str) -> Result<OrderResponse, GatewayError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/orders/{order_id}"))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }
        response
            .json::<OrderResponse>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

/// Maps the processor's order status vocabulary into the canonical set
///
/// Total by construction: unknown values map to `Processing` and are never
/// dropped.
fn map_order_status(raw: &str) -> PaymentStatus {
    match raw {
        "created" | "pending_payment" | "charge_pending" => PaymentStatus::Processing,
        "paid" | "partially_refunded" => PaymentStatus::Completed,
        "declined" | "voided" => PaymentStatus::Failed,
        "expired" | "canceled" => PaymentStatus::Cancelled,
        "refunded" => PaymentStatus::Refunded,
        other => {
            debug!(provider = PROVIDER, raw = other, "unmapped order status, defaulting to processing");
            PaymentStatus::Processing
        }
    }
}

fn map_event(event_type: &str) -> PaymentStatus {
    match event_type {
        "order.paid" | "charge.paid" => PaymentStatus::Completed,
        "order.declined" | "charge.declined" => PaymentStatus::Failed,
        "order.expired" | "order.canceled" | "charge.expired" => PaymentStatus::Cancelled,
        "order.refunded" | "charge.refunded" => PaymentStatus::Refunded,
        "order.created" | "order.pending_payment" | "charge.created" | "charge.pending" => {
            PaymentStatus::Processing
        }
        other => {
            debug!(provider = PROVIDER, raw = other, "unmapped event type, defaulting to processing");
            PaymentStatus::Processing
        }
    }
}

#[async_trait]
impl ProviderGateway for ConektaGateway {
    fn name(&self) -> ProviderName {
        ProviderName::Conekta
    }

    fn refund_window_days(&self) -> i64 {
        self.config.refund_window_days
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        let mut body = json!({
            "currency": request.amount.currency().code(),
            "metadata": {
                "payment_id": request.payment_id.to_string(),
                "purpose_type": request.purpose.kind,
                "purpose_item_id": request.purpose.item_id,
            },
            "customer_info": {
                "name": request.billing.name,
                "email": request.billing.email,
            },
            "line_items": [{
                "name": request.purpose.kind,
                "unit_price": request.amount.minor_units(),
                "quantity": 1,
            }],
        });

        // Voucher charges are attached at creation so the payer gets a
        // store reference without a confirm round-trip
        if request.method == PaymentMethod::CashVoucher {
            body["charges"] = json!([{
                "payment_method": { "type": "oxxo_cash" },
            }]);
        }

        let response = self
            .request(reqwest::Method::POST, "/orders")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        // The voucher reference is what the payer presents at the store
        let voucher_reference = order
            .first_charge()
            .and_then(|c| c.payment_method.as_ref())
            .and_then(|m| m.reference.clone());

        Ok(CreatedIntent {
            external_payment_id: order.id,
            tracking_key: None,
            client_secret: voucher_reference,
        })
    }

    async fn confirm(
        &self,
        external_payment_id: &str,
        details: &MethodDetails,
    ) -> Result<Confirmation, GatewayError> {
        // Confirmation may be retried after a timeout: if the order already
        // carries a charge, return it instead of charging twice
        let order = self.fetch_order(external_payment_id).await?;
        if let Some(charge) = order.first_charge() {
            let raw = order.payment_status.clone().unwrap_or_default();
            return Ok(Confirmation {
                charge_id: charge.id.clone(),
                status: map_order_status(&raw),
                raw_status: raw,
            });
        }

        let payment_method = match details {
            MethodDetails::CardToken { token } => json!({ "type": "card", "token_id": token }),
            MethodDetails::None => json!({ "type": "oxxo_cash" }),
            MethodDetails::WalletAuthorization { .. } => {
                return Err(GatewayError::Rejected {
                    code: "unsupported_method".to_string(),
                    message: "wallet authorizations are not accepted by this processor".to_string(),
                })
            }
        };

        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/orders/{external_payment_id}/charges"),
            )
            .json(&json!({ "payment_method": payment_method }))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let charge: ChargeResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let raw = charge.status.clone().unwrap_or_default();
        Ok(Confirmation {
            charge_id: charge.id,
            status: map_order_status(&raw),
            raw_status: raw,
        })
    }

    async fn get_status(&self, external_payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        let order = self.fetch_order(external_payment_id).await?;
        Ok(map_order_status(
            order.payment_status.as_deref().unwrap_or("created"),
        ))
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
                &format!("/charges/{charge_id}/refunds"),
            )
            .json(&json!({
                "amount": amount.minor_units(),
                "reason": reason,
            }))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
            || status == reqwest::StatusCode::CONFLICT
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
            external_refund_id: refund.id,
            state: match refund.status.as_deref() {
                Some("pending") => RefundState::Pending,
                _ => RefundState::Completed,
            },
        })
    }

    fn verify_webhook_signature(&self, headers: &http::HeaderMap, raw_body: &[u8]) -> bool {
        let Some(provided) = headers.get("digest").and_then(|v| v.to_str().ok()) else {
            return false;
        };
        let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
        verify_hmac_hex(
            self.config.webhook_secret.expose_secret().as_bytes(),
            raw_body,
            provided,
        )
    }

    fn interpret_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, GatewayError> {
        let event: WebhookEnvelope = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        let object = event.data.object;
        // Charge events point at their order; order events carry their own id
        let (order_id, charge_id) = if event.event_type.starts_with("charge.") {
            let order_id = object.order_id.ok_or_else(|| {
                GatewayError::Malformed("charge event without order_id".to_string())
            })?;
            (order_id, Some(object.id))
        } else {
            (object.id, None)
        };

        Ok(ProviderEvent {
            status: map_event(&event.event_type),
            event_type: event.event_type,
            correlation: CorrelationKey::ExternalPaymentId(order_id),
            charge_id,
            payload: serde_json::from_slice(raw_body)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    payment_status: Option<String>,
    charges: Option<ChargeList>,
}

impl OrderResponse {
    fn first_charge(&self) -> Option<&ChargeResponse> {
        self.charges.as_ref().and_then(|c| c.data.first())
    }
}

#[derive(Debug, Deserialize)]
struct ChargeList {
    data: Vec<ChargeResponse>,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: String,
    status: Option<String>,
    payment_method: Option<ChargePaymentMethod>,
}

#[derive(Debug, Deserialize)]
struct ChargePaymentMethod {
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    object: WebhookObject,
}

#[derive(Debug, Deserialize)]
struct WebhookObject {
    id: String,
    order_id: Option<String>,
}
