//! In-memory reference implementation of [`PaymentStore`]
//!
//! Used by the test suites and local development. A single write lock over
//! the record map gives every mutation the same atomic read-modify-write
//! semantics the Postgres adapter provides with conditional updates.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use core_kernel::{PaymentId, RefundId};

use crate::ports::{PaymentStore, RefundEntryData, StatusWrite, StoreError};
use crate::record::{
    CorrelationKey, PaymentRecord, RefundEntry, RefundState, WebhookEventRecord,
};
use crate::method::ProviderName;
use crate::status::PaymentStatus;

/// Non-durable store keyed by payment id
#[derive(Debug, Default)]
pub struct InMemoryPaymentStore {
    records: RwLock<HashMap<PaymentId, PaymentRecord>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, for test assertions
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every stored record, for test assertions
    pub async fn all(&self) -> Vec<PaymentRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!(
                "payment {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn fetch(&self, id: PaymentId) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn find_by_correlation(
        &self,
        provider: ProviderName,
        key: &CorrelationKey,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.provider.name == provider && r.provider.matches(key))
            .cloned())
    }

    async fn bind_provider(
        &self,
        id: PaymentId,
        external_payment_id: Option<&str>,
        tracking_key: Option<&str>,
        charge_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.bind_provider(external_payment_id, tracking_key, charge_id);
        Ok(())
    }

    async fn apply_status(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<StatusWrite, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        let advanced = record.apply_status(status);
        Ok(StatusWrite {
            advanced,
            record: record.clone(),
        })
    }

    async fn mark_failed(
        &self,
        id: PaymentId,
        code: &str,
        message: &str,
    ) -> Result<StatusWrite, StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        let advanced = record.mark_failed(code, message);
        Ok(StatusWrite {
            advanced,
            record: record.clone(),
        })
    }

    async fn append_webhook_event(
        &self,
        id: PaymentId,
        event: &WebhookEventRecord,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        record.webhook_events.push(event.clone());
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn reserve_refund(
        &self,
        id: PaymentId,
        refund: &RefundEntryData,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound)?;

        let reserved = record.reserved_refund_total();
        let after = reserved
            .checked_add(&refund.amount)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        if after.amount() > record.amount.amount() {
            return Err(StoreError::RefundExceedsBalance);
        }

        record.refunds.push(RefundEntry {
            id: refund.id,
            amount: refund.amount,
            reason: refund.reason.clone(),
            state: RefundState::Pending,
            external_refund_id: None,
            processed_at: None,
            created_at: refund.created_at,
        });
        record.updated_at = Utc::now();
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
        let mut records = self.records.write().await;
        let record = records.get_mut(&id).ok_or(StoreError::NotFound)?;
        let entry = record
            .refunds
            .iter_mut()
            .find(|r| r.id == refund_id)
            .ok_or(StoreError::NotFound)?;

        entry.state = state;
        if entry.external_refund_id.is_none() {
            entry.external_refund_id = external_refund_id.map(str::to_owned);
        }
        entry.processed_at = processed_at;
        record.updated_at = Utc::now();
        Ok(())
    }
}
