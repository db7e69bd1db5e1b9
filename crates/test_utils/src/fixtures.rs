//! Common test fixtures

use core_kernel::{Currency, Money};
use domain_payments::{
    BankTransferDetails, BillPaymentDetails, BillService, BillingDetails, Purpose,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// A CLABE with a valid check digit
pub const VALID_CLABE: &str = "032180000118359719";

/// Monetary fixtures
pub struct MoneyFixtures;

impl MoneyFixtures {
    pub fn mxn(amount: Decimal) -> Money {
        Money::new(amount, Currency::MXN)
    }

    /// The standard course price used across tests
    pub fn course_price() -> Money {
        Self::mxn(dec!(1000))
    }
}

/// Billing detail fixtures per payment method
pub struct BillingFixtures;

impl BillingFixtures {
    pub fn card() -> BillingDetails {
        BillingDetails::new("Ana Torres", "ana@example.com")
    }

    pub fn bank_transfer() -> BillingDetails {
        Self::card().with_bank_transfer(BankTransferDetails {
            beneficiary_name: "Escuela Aula SA de CV".to_string(),
            beneficiary_clabe: VALID_CLABE.to_string(),
            institution_code: "40012".to_string(),
        })
    }

    pub fn bill_payment() -> BillingDetails {
        Self::card().with_bill_payment(BillPaymentDetails {
            service: BillService::Electricity,
            agreement_code: "1234567".to_string(),
            reference: "REF001234".to_string(),
        })
    }
}

/// Purpose fixtures
pub struct PurposeFixtures;

impl PurposeFixtures {
    pub fn course() -> Purpose {
        Purpose::new("course", "rust-101")
    }

    pub fn webinar() -> Purpose {
        Purpose::new("webinar", "async-deep-dive")
    }
}
