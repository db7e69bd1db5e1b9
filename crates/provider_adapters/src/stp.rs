//! Interbank-transfer and bill-payment network gateway
//!
//! Unlike the token-authenticated processors, every order sent to this
//! network carries an RSA-SHA256 signature over a pipe-delimited cadena
//! original of the order fields. Orders are correlated by clave de rastreo
//! (tracking key), which is derived deterministically from the payment id
//! so a retried registration cannot produce a duplicate order.
//!
//! Webhooks are HMAC-signed over the raw body in the `x-stp-firma` header.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use core_kernel::PaymentId;
use domain_payments::{
    Confirmation, CorrelationKey, CreatedIntent, GatewayError, IntentRequest, MethodDetails,
    PaymentMethod, PaymentStatus, ProviderEvent, ProviderGateway, ProviderName, RefundOutcome,
    RefundState,
};

use crate::http::{response_error, transport_error};
use crate::signature::verify_hmac_hex;

const PROVIDER: &str = "stp";

/// Configuration for the interbank network
#[derive(Clone)]
pub struct StpConfig {
    /// Registered company name (empresa) on the network
    pub company: String,
    /// PKCS#8 RSA private key, base64-encoded DER
    pub signing_key: SecretString,
    pub webhook_secret: SecretString,
    pub base_url: String,
    pub timeout: Duration,
    pub refund_window_days: i64,
}

impl StpConfig {
    pub fn new(
        company: impl Into<String>,
        signing_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            company: company.into(),
            signing_key: SecretString::new(signing_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            base_url: "https://prod.stpmex.com/speiws/rest".to_string(),
            timeout: Duration::from_secs(15),
            refund_window_days: 5,
        }
    }

    /// Overrides the API base URL (for testing)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Gateway for the interbank-transfer and bill-payment network
pub struct StpGateway {
    config: StpConfig,
    client: reqwest::Client,
}

impl StpGateway {
    pub fn new(config: StpConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Signs a cadena original with the company's RSA key
    fn sign_cadena(&self, cadena: &str) -> Result<String, GatewayError> {
        let der = BASE64
            .decode(self.config.signing_key.expose_secret())
            .map_err(|_| GatewayError::Auth(format!("{PROVIDER}: signing key is not valid base64")))?;
        let key_pair = RsaKeyPair::from_pkcs8(&der)
            .map_err(|e| GatewayError::Auth(format!("{PROVIDER}: signing key rejected: {e}")))?;

        let rng = SystemRandom::new();
        let mut signature = vec![0u8; key_pair.public().modulus_len()];
        key_pair
            .sign(&RSA_PKCS1_SHA256, &rng, cadena.as_bytes(), &mut signature)
            .map_err(|_| GatewayError::Auth(format!("{PROVIDER}: order signing failed")))?;

        Ok(BASE64.encode(signature))
    }

    async fn put(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::Response, GatewayError> {
        self.client
            .put(format!("{}{}", self.config.base_url, path))
            .timeout(self.config.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER, e))
    }
}

/// Derives the clave de rastreo for a payment
///
/// Deterministic per payment id, alphanumeric, within the network's
/// 30-character limit.
fn tracking_key_for(payment_id: PaymentId) -> String {
    let simple = payment_id.as_uuid().simple().to_string();
    format!("AP{}", &simple[..26]).to_uppercase()
}

/// Builds a cadena original: the pipe-delimited field string the network
/// signs and verifies
fn cadena_original(fields: &[&str]) -> String {
    format!("||{}||", fields.join("|"))
}

/// Maps the network's order states into the canonical set; unknown values
/// default to `Processing`
fn map_estado(raw: &str) -> PaymentStatus {
    match raw {
        "PENDIENTE" | "AUTORIZADA" | "CAPTURADA" | "EN_PROCESO" | "TRASPASO" => {
            PaymentStatus::Processing
        }
        "LIQUIDADA" => PaymentStatus::Completed,
        "RECHAZADA" => PaymentStatus::Failed,
        "CANCELADA" => PaymentStatus::Cancelled,
        "DEVUELTA" => PaymentStatus::Refunded,
        other => {
            debug!(provider = PROVIDER, raw = other, "unmapped estado, defaulting to processing");
            PaymentStatus::Processing
        }
    }
}

#[async_trait]
impl ProviderGateway for StpGateway {
    fn name(&self) -> ProviderName {
        ProviderName::Stp
    }

    fn refund_window_days(&self) -> i64 {
        self.config.refund_window_days
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        let tracking_key = tracking_key_for(request.payment_id);
        let amount = format!("{:.2}", request.amount.amount());

        let body = match request.method {
            PaymentMethod::BankTransfer => {
                let transfer = request.billing.bank_transfer.as_ref().ok_or_else(|| {
                    GatewayError::Rejected {
                        code: "missing_beneficiary".to_string(),
                        message: "bank transfer order without beneficiary details".to_string(),
                    }
                })?;
                let cadena = cadena_original(&[
                    &self.config.company,
                    &tracking_key,
                    &amount,
                    &transfer.institution_code,
                    &transfer.beneficiary_clabe,
                    &transfer.beneficiary_name,
                    &request.purpose.item_id,
                ]);
                json!({
                    "empresa": self.config.company,
                    "claveRastreo": tracking_key,
                    "monto": amount,
                    "institucionContraparte": transfer.institution_code,
                    "cuentaBeneficiario": transfer.beneficiary_clabe,
                    "nombreBeneficiario": transfer.beneficiary_name,
                    "conceptoPago": request.purpose.kind,
                    "referenciaNumerica": request.purpose.item_id,
                    "firma": self.sign_cadena(&cadena)?,
                })
            }
            PaymentMethod::BillPayment => {
                let bill = request.billing.bill_payment.as_ref().ok_or_else(|| {
                    GatewayError::Rejected {
                        code: "missing_agreement".to_string(),
                        message: "bill payment order without agreement details".to_string(),
                    }
                })?;
                let cadena = cadena_original(&[
                    &self.config.company,
                    &tracking_key,
                    &amount,
                    &bill.agreement_code,
                    &bill.reference,
                ]);
                json!({
                    "empresa": self.config.company,
                    "claveRastreo": tracking_key,
                    "monto": amount,
                    "convenio": bill.agreement_code,
                    "referencia": bill.reference,
                    "tipoServicio": bill.service.as_str(),
                    "firma": self.sign_cadena(&cadena)?,
                })
            }
            other => {
                return Err(GatewayError::Rejected {
                    code: "unsupported_method".to_string(),
                    message: format!("{other} is not routed through the interbank network"),
                })
            }
        };

        let response = self.put("/ordenPago/registra", body).await?;
        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let registered: RegisterResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if let Some(error) = registered.resultado.descripcion_error.filter(|d| !d.is_empty()) {
            return Err(GatewayError::Rejected {
                code: "order_rejected".to_string(),
                message: error,
            });
        }

        Ok(CreatedIntent {
            external_payment_id: registered.resultado.id.to_string(),
            tracking_key: Some(tracking_key),
            client_secret: None,
        })
    }

    /// The network has no confirmation step; a registered order settles on
    /// its own. Confirm reads the current state so retries are harmless.
    async fn confirm(
        &self,
        external_payment_id: &str,
        _details: &MethodDetails,
    ) -> Result<Confirmation, GatewayError> {
        let estado = self.consulta(external_payment_id).await?;
        Ok(Confirmation {
            charge_id: external_payment_id.to_string(),
            status: map_estado(&estado),
            raw_status: estado,
        })
    }

    async fn get_status(&self, external_payment_id: &str) -> Result<PaymentStatus, GatewayError> {
        let estado = self.consulta(external_payment_id).await?;
        Ok(map_estado(&estado))
    }

    async fn refund(
        &self,
        charge_id: &str,
        amount: core_kernel::Money,
        reason: &str,
    ) -> Result<RefundOutcome, GatewayError> {
        let amount_str = format!("{:.2}", amount.amount());
        let cadena = cadena_original(&[&self.config.company, charge_id, &amount_str, reason]);
        let body = json!({
            "empresa": self.config.company,
            "idOrden": charge_id,
            "monto": amount_str,
            "motivoDevolucion": reason,
            "firma": self.sign_cadena(&cadena)?,
        });

        let response = self.put("/ordenPago/devolucion", body).await?;
        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let registered: RegisterResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if let Some(error) = registered.resultado.descripcion_error.filter(|d| !d.is_empty()) {
            // The network rejects returns outside the settlement window or
            // for already-returned orders
            return Err(GatewayError::NotRefundable(error));
        }

        Ok(RefundOutcome {
            external_refund_id: registered.resultado.id.to_string(),
            state: RefundState::Pending,
        })
    }

    fn verify_webhook_signature(&self, headers: &http::HeaderMap, raw_body: &[u8]) -> bool {
        let Some(provided) = headers.get("x-stp-firma").and_then(|v| v.to_str().ok()) else {
            return false;
        };
        verify_hmac_hex(
            self.config.webhook_secret.expose_secret().as_bytes(),
            raw_body,
            provided,
        )
    }

    fn interpret_webhook(&self, raw_body: &[u8]) -> Result<ProviderEvent, GatewayError> {
        let event: OrderEvent = serde_json::from_slice(raw_body)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;

        Ok(ProviderEvent {
            event_type: format!("orden.{}", event.estado.to_lowercase()),
            correlation: CorrelationKey::TrackingKey(event.clave_rastreo),
            status: map_estado(&event.estado),
            charge_id: event.id.map(|id| id.to_string()),
            payload: serde_json::from_slice(raw_body)
                .map_err(|e| GatewayError::Malformed(e.to_string()))?,
        })
    }
}

impl StpGateway {
    async fn consulta(&self, order_id: &str) -> Result<String, GatewayError> {
        let cadena = cadena_original(&[&self.config.company, order_id]);
        let body = json!({
            "empresa": self.config.company,
            "idOrden": order_id,
            "firma": self.sign_cadena(&cadena)?,
        });

        let response = self.put("/ordenPago/consulta", body).await?;
        if !response.status().is_success() {
            return Err(response_error(PROVIDER, response).await);
        }

        let consulta: ConsultaResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        Ok(consulta.resultado.estado.unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct RegisterResponse {
    resultado: RegisterResult,
}

#[derive(Debug, Deserialize)]
struct RegisterResult {
    id: i64,
    #[serde(rename = "descripcionError")]
    descripcion_error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConsultaResponse {
    resultado: ConsultaResult,
}

#[derive(Debug, Deserialize)]
struct ConsultaResult {
    estado: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderEvent {
    id: Option<i64>,
    #[serde(rename = "claveRastreo")]
    clave_rastreo: String,
    estado: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::{hex_encode, hmac_sha256};

    fn gateway() -> StpGateway {
        StpGateway::new(StpConfig::new("AULAPAY", "bm90LWEta2V5", "stp_secret"))
    }

    #[test]
    fn test_estado_mapping_is_total() {
        assert_eq!(map_estado("LIQUIDADA"), PaymentStatus::Completed);
        assert_eq!(map_estado("PENDIENTE"), PaymentStatus::Processing);
        assert_eq!(map_estado("RECHAZADA"), PaymentStatus::Failed);
        assert_eq!(map_estado("CANCELADA"), PaymentStatus::Cancelled);
        assert_eq!(map_estado("DEVUELTA"), PaymentStatus::Refunded);
        assert_eq!(map_estado("ESTADO_NUEVO"), PaymentStatus::Processing);
    }

    #[test]
    fn test_tracking_key_is_deterministic_and_bounded() {
        let payment_id = PaymentId::new();
        let a = tracking_key_for(payment_id);
        let b = tracking_key_for(payment_id);

        assert_eq!(a, b);
        assert!(a.len() <= 30);
        assert!(a.starts_with("AP"));
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_distinct_payments_get_distinct_tracking_keys() {
        assert_ne!(
            tracking_key_for(PaymentId::new()),
            tracking_key_for(PaymentId::new())
        );
    }

    #[test]
    fn test_cadena_original_layout() {
        let cadena = cadena_original(&["AULAPAY", "AP123", "1000.00", "40012"]);
        assert_eq!(cadena, "||AULAPAY|AP123|1000.00|40012||");
    }

    #[test]
    fn test_sign_rejects_invalid_key() {
        let gw = gateway();
        // "bm90LWEta2V5" is valid base64 but not a PKCS#8 key
        let error = gw.sign_cadena("||AULAPAY|X||").unwrap_err();
        assert!(matches!(error, GatewayError::Auth(_)));

        let gw = StpGateway::new(StpConfig::new("AULAPAY", "!!!not-base64!!!", "s"));
        let error = gw.sign_cadena("||AULAPAY|X||").unwrap_err();
        assert!(matches!(error, GatewayError::Auth(_)));
    }

    #[test]
    fn test_webhook_signature_round_trip() {
        let gw = gateway();
        let body = br#"{"id":7,"claveRastreo":"AP123","estado":"LIQUIDADA"}"#;
        let signature = hex_encode(&hmac_sha256(b"stp_secret", body));

        let mut headers = http::HeaderMap::new();
        headers.insert("x-stp-firma", signature.parse().unwrap());
        assert!(gw.verify_webhook_signature(&headers, body));

        assert!(!gw.verify_webhook_signature(&headers, br#"{"estado":"DEVUELTA"}"#));
        assert!(!gw.verify_webhook_signature(&http::HeaderMap::new(), body));
    }

    #[test]
    fn test_interpret_webhook_correlates_by_tracking_key() {
        let gw = gateway();
        let body = br#"{"id":7,"claveRastreo":"AP123","estado":"LIQUIDADA"}"#;

        let event = gw.interpret_webhook(body).unwrap();
        assert_eq!(event.event_type, "orden.liquidada");
        assert_eq!(
            event.correlation,
            CorrelationKey::TrackingKey("AP123".to_string())
        );
        assert_eq!(event.status, PaymentStatus::Completed);
        assert_eq!(event.charge_id.as_deref(), Some("7"));
    }

    #[test]
    fn test_interpret_rejects_event_without_tracking_key() {
        let gw = gateway();
        assert!(matches!(
            gw.interpret_webhook(br#"{"estado":"LIQUIDADA"}"#),
            Err(GatewayError::Malformed(_))
        ));
    }
}
