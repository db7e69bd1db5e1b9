//! Provider webhook ingress
//!
//! One route per provider. Acknowledgments are fast and carry no internal
//! detail: only a failed signature verification is surfaced as an error,
//! so a provider's retry policy cannot be triggered by a local processing
//! bug.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;

use domain_payments::{PaymentError, ProviderName};

use crate::error::ApiError;
use crate::AppState;

/// Ingests a webhook delivery for the provider named in the route
pub async fn ingest(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let provider = ProviderName::parse(&provider)
        .ok_or_else(|| ApiError::NotFound(format!("unknown provider route '{provider}'")))?;

    match state.reconciler.ingest(provider, &headers, &body).await {
        Ok(_ack) => Ok((StatusCode::OK, Json(json!({ "received": true })))),
        Err(PaymentError::InvalidSignature) => Err(PaymentError::InvalidSignature.into()),
        // Anything else was already logged; acknowledge so the provider
        // does not retry-storm us
        Err(_) => Ok((StatusCode::OK, Json(json!({ "received": true })))),
    }
}
