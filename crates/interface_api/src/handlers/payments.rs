//! Payment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use core_kernel::{Money, PaymentId};
use domain_payments::{CreatePaymentRequest, MethodDetails, PaymentError};

use crate::dto::payments::*;
use crate::error::ApiError;
use crate::middleware::CallerIdentity;
use crate::AppState;

fn parse_payment_id(raw: &str) -> Result<PaymentId, ApiError> {
    raw.parse::<PaymentId>()
        .map_err(|_| ApiError::NotFound(format!("payment {raw} not found")))
}

/// Creates a payment
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Json(body): Json<CreatePaymentBody>,
) -> Result<(StatusCode, Json<CreatePaymentResponse>), ApiError> {
    let parsed = body.parse().map_err(PaymentError::from)?;

    let created = state
        .orchestrator
        .create(CreatePaymentRequest {
            user_id: caller.0,
            amount: parsed.amount,
            method: parsed.method,
            purpose: parsed.purpose,
            billing: parsed.billing,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePaymentResponse {
            payment_id: created.payment_id.to_string(),
            provider_client_secret: created.client_secret,
            provider_tracking_key: created.tracking_key,
        }),
    ))
}

/// Returns the current payment projection, polling the provider while the
/// payment is still processing
pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let id = parse_payment_id(&id)?;
    let record = state.orchestrator.poll(id).await?;
    Ok(Json(PaymentResponse::from(&record)))
}

/// Confirms a payment
pub async fn confirm_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmPaymentBody>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let id = parse_payment_id(&id)?;
    let details = body.method_details.unwrap_or(MethodDetails::None);
    let record = state.orchestrator.confirm(id, details).await?;
    Ok(Json(PaymentResponse::from(&record)))
}

/// Refunds a payment, partially or in full
pub async fn refund_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RefundBody>,
) -> Result<(StatusCode, Json<RefundResponse>), ApiError> {
    let id = parse_payment_id(&id)?;

    // The refund amount inherits the payment currency
    let record = state.orchestrator.poll(id).await?;
    let amount = body
        .amount
        .map(|a| Money::new(a, record.amount.currency()));

    let entry = state.orchestrator.refund(id, amount, &body.reason).await?;
    Ok((StatusCode::CREATED, Json(RefundResponse::from(&entry))))
}
