//! Payment repository implementation
//!
//! PostgreSQL adapter for the [`PaymentStore`] port. Status writes are
//! single conditional UPDATEs guarded on the stored lifecycle rank, so two
//! writers racing on the same record cannot both win; refund reservations
//! run in a transaction that locks the payment row and re-checks the
//! balance before inserting.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use core_kernel::{Currency, Money, PaymentId, RefundId, UserId, WebhookEventId};
use domain_payments::{
    BillingDetails, CorrelationKey, PaymentFailure, PaymentMethod, PaymentRecord, PaymentStatus,
    PaymentStore, ProviderName, ProviderRefs, Purpose, RefundEntry, RefundEntryData, RefundState,
    StatusAttempt, StatusWrite, StoreError, WebhookEventRecord,
};

use crate::error::DatabaseError;

/// Repository for payment records and their append-only child logs
#[derive(Debug, Clone)]
pub struct PgPaymentStore {
    pool: PgPool,
}

impl PgPaymentStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, id: PaymentId) -> Result<Option<PaymentRecord>, StoreError> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT payment_id, user_id, amount, currency, method,
                   purpose_type, purpose_item_id, status, provider,
                   external_payment_id, external_tracking_key, external_charge_id,
                   billing, error_code, error_message, created_at, updated_at
            FROM payments
            WHERE payment_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let attempts = sqlx::query_as::<_, AttemptRow>(
            r#"
            SELECT status, occurred_at
            FROM payment_attempts
            WHERE payment_id = $1
            ORDER BY attempt_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let events = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT event_id, event_type, received_at, payload
            FROM payment_webhook_events
            WHERE payment_id = $1
            ORDER BY received_at, event_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let refunds = sqlx::query_as::<_, RefundRow>(
            r#"
            SELECT refund_id, amount, reason, status, external_refund_id,
                   processed_at, created_at
            FROM payment_refunds
            WHERE payment_id = $1
            ORDER BY created_at, refund_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(Some(assemble(row, attempts, events, refunds)?))
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        let billing = serde_json::to_value(&record.billing)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, user_id, amount, currency, method,
                purpose_type, purpose_item_id, status, status_rank, provider,
                external_payment_id, external_tracking_key, external_charge_id,
                billing, error_code, error_message, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                      $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.user_id.as_uuid())
        .bind(record.amount.amount())
        .bind(record.amount.currency().code())
        .bind(record.method.as_str())
        .bind(&record.purpose.kind)
        .bind(&record.purpose.item_id)
        .bind(record.status.as_str())
        .bind(record.status.lifecycle_rank() as i16)
        .bind(record.provider.name.as_str())
        .bind(&record.provider.external_payment_id)
        .bind(&record.provider.tracking_key)
        .bind(&record.provider.charge_id)
        .bind(billing)
        .bind(record.failure.as_ref().map(|f| f.code.as_str()))
        .bind(record.failure.as_ref().map(|f| f.message.as_str()))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        for attempt in &record.attempts {
            sqlx::query(
                "INSERT INTO payment_attempts (payment_id, status, occurred_at) VALUES ($1, $2, $3)",
            )
            .bind(record.id.as_uuid())
            .bind(attempt.status.as_str())
            .bind(attempt.occurred_at)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn fetch(&self, id: PaymentId) -> Result<Option<PaymentRecord>, StoreError> {
        self.load(id).await
    }

    async fn find_by_correlation(
        &self,
        provider: ProviderName,
        key: &CorrelationKey,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let (column, value) = match key {
            CorrelationKey::ExternalPaymentId(v) => ("external_payment_id", v),
            CorrelationKey::TrackingKey(v) => ("external_tracking_key", v),
            CorrelationKey::ChargeId(v) => ("external_charge_id", v),
        };

        let query = format!(
            "SELECT payment_id FROM payments WHERE provider = $1 AND {column} = $2"
        );
        let row: Option<(Uuid,)> = sqlx::query_as(&query)
            .bind(provider.as_str())
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        match row {
            Some((payment_id,)) => self.load(PaymentId::from_uuid(payment_id)).await,
            None => Ok(None),
        }
    }

    async fn bind_provider(
        &self,
        id: PaymentId,
        external_payment_id: Option<&str>,
        tracking_key: Option<&str>,
        charge_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET external_payment_id = COALESCE(external_payment_id, $2),
                external_tracking_key = COALESCE(external_tracking_key, $3),
                external_charge_id = COALESCE(external_charge_id, $4),
                updated_at = $5
            WHERE payment_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(external_payment_id)
        .bind(tracking_key)
        .bind(charge_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn apply_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<StatusWrite, StoreError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // The rank guard makes this a compare-and-swap: a concurrent writer
        // that already advanced the record leaves nothing for us to update
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2,
                status_rank = $3,
                error_code = CASE WHEN $2 = 'failed' THEN error_code ELSE NULL END,
                error_message = CASE WHEN $2 = 'failed' THEN error_message ELSE NULL END,
                updated_at = $4
            WHERE payment_id = $1 AND status_rank < $3
            "#,
        )
        .bind(id.as_uuid())
        .bind(status.as_str())
        .bind(status.lifecycle_rank() as i16)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        let advanced = result.rows_affected() > 0;
        if advanced {
            sqlx::query(
                "INSERT INTO payment_attempts (payment_id, status, occurred_at) VALUES ($1, $2, $3)",
            )
            .bind(id.as_uuid())
            .bind(status.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;

        let record = self.load(id).await?.ok_or(StoreError::NotFound)?;
        Ok(StatusWrite { advanced, record })
    }

    async fn mark_failed(
        &self,
        id: PaymentId,
        code: &str,
        message: &str,
    ) -> Result<StatusWrite, StoreError> {
        let now = Utc::now();
        let failed = PaymentStatus::Failed;
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, status_rank = $3, error_code = $4, error_message = $5, updated_at = $6
            WHERE payment_id = $1 AND status_rank < $3
            "#,
        )
        .bind(id.as_uuid())
        .bind(failed.as_str())
        .bind(failed.lifecycle_rank() as i16)
        .bind(code)
        .bind(message)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        let advanced = result.rows_affected() > 0;
        if advanced {
            sqlx::query(
                "INSERT INTO payment_attempts (payment_id, status, occurred_at) VALUES ($1, $2, $3)",
            )
            .bind(id.as_uuid())
            .bind(failed.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        }

        tx.commit().await.map_err(store_err)?;

        let record = self.load(id).await?.ok_or(StoreError::NotFound)?;
        Ok(StatusWrite { advanced, record })
    }

    async fn append_webhook_event(
        &self,
        id: PaymentId,
        event: &WebhookEventRecord,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO payment_webhook_events (event_id, payment_id, event_type, received_at, payload)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(id.as_uuid())
        .bind(&event.event_type)
        .bind(event.received_at)
        .bind(&event.payload)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn reserve_refund(
        &self,
        id: PaymentId,
        refund: &RefundEntryData,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;

        // Row lock serializes concurrent refunds for this payment
        let payment: Option<(Decimal,)> =
            sqlx::query_as("SELECT amount FROM payments WHERE payment_id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_err)?;
        let (amount,) = payment.ok_or(StoreError::NotFound)?;

        let (reserved,): (Decimal,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM payment_refunds
            WHERE payment_id = $1 AND status <> 'failed'
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(store_err)?;

        if reserved + refund.amount.amount() > amount {
            return Err(StoreError::RefundExceedsBalance);
        }

        sqlx::query(
            r#"
            INSERT INTO payment_refunds (refund_id, payment_id, amount, reason, status, created_at)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            "#,
        )
        .bind(refund.id.as_uuid())
        .bind(id.as_uuid())
        .bind(refund.amount.amount())
        .bind(&refund.reason)
        .bind(refund.created_at)
        .execute(&mut *tx)
        .await
        .map_err(store_err)?;

        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn settle_refund(
        &self,
        id: PaymentId,
        refund_id: RefundId,
        state: RefundState,
        external_refund_id: Option<&str>,
        processed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_refunds
            SET status = $3,
                external_refund_id = COALESCE(external_refund_id, $4),
                processed_at = $5
            WHERE payment_id = $1 AND refund_id = $2
            "#,
        )
        .bind(id.as_uuid())
        .bind(refund_id.as_uuid())
        .bind(refund_state_str(state))
        .bind(external_refund_id)
        .bind(processed_at)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn store_err(error: sqlx::Error) -> StoreError {
    DatabaseError::from(error).into()
}

fn refund_state_str(state: RefundState) -> &'static str {
    match state {
        RefundState::Pending => "pending",
        RefundState::Completed => "completed",
        RefundState::Failed => "failed",
    }
}

fn parse_refund_state(s: &str) -> Result<RefundState, StoreError> {
    match s {
        "pending" => Ok(RefundState::Pending),
        "completed" => Ok(RefundState::Completed),
        "failed" => Ok(RefundState::Failed),
        other => Err(StoreError::Serialization(format!(
            "unknown refund state '{other}'"
        ))),
    }
}

fn parse_status(s: &str) -> Result<PaymentStatus, StoreError> {
    PaymentStatus::parse(s)
        .ok_or_else(|| StoreError::Serialization(format!("unknown payment status '{s}'")))
}

fn assemble(
    row: PaymentRow,
    attempts: Vec<AttemptRow>,
    events: Vec<EventRow>,
    refunds: Vec<RefundRow>,
) -> Result<PaymentRecord, StoreError> {
    let currency = Currency::parse(&row.currency)
        .ok_or_else(|| StoreError::Serialization(format!("unknown currency '{}'", row.currency)))?;
    let method = PaymentMethod::parse(&row.method)
        .ok_or_else(|| StoreError::Serialization(format!("unknown method '{}'", row.method)))?;
    let provider = ProviderName::parse(&row.provider)
        .ok_or_else(|| StoreError::Serialization(format!("unknown provider '{}'", row.provider)))?;
    let billing: BillingDetails = serde_json::from_value(row.billing)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;

    let attempts = attempts
        .into_iter()
        .map(|a| {
            Ok(StatusAttempt {
                status: parse_status(&a.status)?,
                occurred_at: a.occurred_at,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let webhook_events = events
        .into_iter()
        .map(|e| WebhookEventRecord {
            id: WebhookEventId::from_uuid(e.event_id),
            event_type: e.event_type,
            received_at: e.received_at,
            payload: e.payload,
        })
        .collect();

    let refunds = refunds
        .into_iter()
        .map(|r| {
            Ok(RefundEntry {
                id: RefundId::from_uuid(r.refund_id),
                amount: Money::new(r.amount, currency),
                reason: r.reason,
                state: parse_refund_state(&r.status)?,
                external_refund_id: r.external_refund_id,
                processed_at: r.processed_at,
                created_at: r.created_at,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    let failure = match (row.error_code, row.error_message) {
        (Some(code), Some(message)) => Some(PaymentFailure { code, message }),
        (Some(code), None) => Some(PaymentFailure {
            code,
            message: String::new(),
        }),
        _ => None,
    };

    Ok(PaymentRecord {
        id: PaymentId::from_uuid(row.payment_id),
        user_id: UserId::from_uuid(row.user_id),
        amount: Money::new(row.amount, currency),
        method,
        purpose: Purpose {
            kind: row.purpose_type,
            item_id: row.purpose_item_id,
        },
        status: parse_status(&row.status)?,
        provider: ProviderRefs {
            name: provider,
            external_payment_id: row.external_payment_id,
            tracking_key: row.external_tracking_key,
            charge_id: row.external_charge_id,
        },
        billing,
        attempts,
        webhook_events,
        refunds,
        failure,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    currency: String,
    method: String,
    purpose_type: String,
    purpose_item_id: String,
    status: String,
    provider: String,
    external_payment_id: Option<String>,
    external_tracking_key: Option<String>,
    external_charge_id: Option<String>,
    billing: serde_json::Value,
    error_code: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct AttemptRow {
    status: String,
    occurred_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    event_id: Uuid,
    event_type: String,
    received_at: DateTime<Utc>,
    payload: serde_json::Value,
}

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    refund_id: Uuid,
    amount: Decimal,
    reason: String,
    status: String,
    external_refund_id: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
