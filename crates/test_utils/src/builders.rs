//! Test Data Builders
//!
//! Builder patterns for constructing test data with sensible defaults.
//! Tests specify only the relevant fields and take defaults for the rest.

use core_kernel::{Money, UserId};
use domain_payments::{
    BillingDetails, PaymentMethod, PaymentRecord, PaymentStatus, Purpose,
};

use crate::fixtures::{BillingFixtures, MoneyFixtures, PurposeFixtures};

/// Builder for payment records in a chosen lifecycle position
pub struct PaymentRecordBuilder {
    user_id: UserId,
    amount: Money,
    method: PaymentMethod,
    purpose: Purpose,
    billing: BillingDetails,
    statuses: Vec<PaymentStatus>,
    external_payment_id: Option<String>,
    tracking_key: Option<String>,
    charge_id: Option<String>,
}

impl Default for PaymentRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentRecordBuilder {
    /// Creates a builder for a pending card payment
    pub fn new() -> Self {
        Self {
            user_id: UserId::new(),
            amount: MoneyFixtures::course_price(),
            method: PaymentMethod::Card,
            purpose: PurposeFixtures::course(),
            billing: BillingFixtures::card(),
            statuses: Vec::new(),
            external_payment_id: None,
            tracking_key: None,
            charge_id: None,
        }
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_purpose(mut self, purpose: Purpose) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn with_billing(mut self, billing: BillingDetails) -> Self {
        self.billing = billing;
        self
    }

    /// Advances the built record through the given statuses in order
    pub fn advanced_through(mut self, statuses: &[PaymentStatus]) -> Self {
        self.statuses = statuses.to_vec();
        self
    }

    pub fn with_external_payment_id(mut self, id: impl Into<String>) -> Self {
        self.external_payment_id = Some(id.into());
        self
    }

    pub fn with_tracking_key(mut self, key: impl Into<String>) -> Self {
        self.tracking_key = Some(key.into());
        self
    }

    pub fn with_charge_id(mut self, id: impl Into<String>) -> Self {
        self.charge_id = Some(id.into());
        self
    }

    /// Builds a completed card payment bound to provider identifiers
    pub fn completed() -> PaymentRecord {
        Self::new()
            .with_external_payment_id("ord_test_1")
            .with_charge_id("chg_test_1")
            .advanced_through(&[PaymentStatus::Processing, PaymentStatus::Completed])
            .build()
    }

    pub fn build(self) -> PaymentRecord {
        let mut record = PaymentRecord::new(
            self.user_id,
            self.amount,
            self.method,
            self.purpose,
            self.billing,
        );
        record.bind_provider(
            self.external_payment_id.as_deref(),
            self.tracking_key.as_deref(),
            self.charge_id.as_deref(),
        );
        for status in self.statuses {
            record.apply_status(status);
        }
        record
    }
}
