//! Webhook reconciliation
//!
//! Applies verified provider events to the matching Payment Record. Events
//! are recorded in the append-only webhook log before application, and the
//! status write goes through the same monotonic rule as every other source,
//! so duplicated or out-of-order deliveries converge on the same final
//! state.
//!
//! Only signature failures are surfaced to the provider; everything else is
//! acknowledged so a local processing bug cannot trigger a delivery-retry
//! storm.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::PaymentError;
use crate::method::ProviderName;
use crate::orchestrator::GatewayRegistry;
use crate::ports::PaymentStore;
use crate::record::WebhookEventRecord;
use crate::status::PaymentStatus;

/// What happened to a delivery that was acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookDisposition {
    /// The event advanced the record to a new status
    Applied(PaymentStatus),
    /// The event was recorded but represented no forward progress
    Stale,
    /// No record matched the event's correlation key
    Unmatched,
    /// Reconciliation failed after verification; logged and swallowed
    Ignored,
}

/// Acknowledgment returned to the webhook route
#[derive(Debug, Clone, Copy)]
pub struct WebhookAck {
    pub disposition: WebhookDisposition,
}

/// The reconciliation service
pub struct WebhookReconciler {
    store: Arc<dyn PaymentStore>,
    gateways: Arc<GatewayRegistry>,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn PaymentStore>, gateways: Arc<GatewayRegistry>) -> Self {
        Self { store, gateways }
    }

    /// Ingests one inbound delivery for the given provider route
    ///
    /// Returns an error only for signature verification failures; every
    /// other outcome acknowledges the delivery.
    pub async fn ingest(
        &self,
        provider: ProviderName,
        headers: &http::HeaderMap,
        raw_body: &[u8],
    ) -> Result<WebhookAck, PaymentError> {
        let gateway = self.gateways.get(provider).ok_or_else(|| {
            error!(provider = %provider, "no gateway registered for webhook route");
            PaymentError::ProviderAuth(format!("no gateway registered for {provider}"))
        })?;

        if !gateway.verify_webhook_signature(headers, raw_body) {
            warn!(provider = %provider, "webhook signature verification failed");
            return Err(PaymentError::InvalidSignature);
        }

        let event = match gateway.interpret_webhook(raw_body) {
            Ok(event) => event,
            Err(error) => {
                warn!(provider = %provider, %error, "verified webhook could not be decoded");
                return Ok(WebhookAck {
                    disposition: WebhookDisposition::Ignored,
                });
            }
        };

        let record = match self
            .store
            .find_by_correlation(provider, &event.correlation)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                // The event may be for a payment this core never created,
                // or it raced the create call's write; tolerated, not fatal
                info!(
                    provider = %provider,
                    event_type = %event.event_type,
                    correlation = ?event.correlation,
                    "webhook did not match any payment record"
                );
                return Ok(WebhookAck {
                    disposition: WebhookDisposition::Unmatched,
                });
            }
            Err(error) => {
                error!(provider = %provider, %error, "store lookup failed during reconciliation");
                return Ok(WebhookAck {
                    disposition: WebhookDisposition::Ignored,
                });
            }
        };

        // Recorded unconditionally, duplicates and stale events included
        let log_entry = WebhookEventRecord::new(event.event_type.clone(), event.payload.clone());
        if let Err(error) = self.store.append_webhook_event(record.id, &log_entry).await {
            error!(payment_id = %record.id, %error, "failed to append webhook event");
            return Ok(WebhookAck {
                disposition: WebhookDisposition::Ignored,
            });
        }

        if let Some(charge_id) = event.charge_id.as_deref() {
            if let Err(error) = self
                .store
                .bind_provider(record.id, None, None, Some(charge_id))
                .await
            {
                error!(payment_id = %record.id, %error, "failed to bind charge id from webhook");
            }
        }

        match self.store.apply_status(record.id, event.status).await {
            Ok(write) if write.advanced => {
                info!(
                    payment_id = %record.id,
                    event_type = %event.event_type,
                    status = %event.status,
                    "webhook advanced payment status"
                );
                Ok(WebhookAck {
                    disposition: WebhookDisposition::Applied(event.status),
                })
            }
            Ok(_) => Ok(WebhookAck {
                disposition: WebhookDisposition::Stale,
            }),
            Err(error) => {
                error!(payment_id = %record.id, %error, "status apply failed during reconciliation");
                Ok(WebhookAck {
                    disposition: WebhookDisposition::Ignored,
                })
            }
        }
    }
}
