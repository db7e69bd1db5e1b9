//! Per-method request validation
//!
//! The field schema selected by payment method is applied before any
//! provider adapter is invoked. Validation fails fast with a field-level
//! detail list; nothing is persisted on failure.

use std::fmt;
use validator::ValidateEmail;

use core_kernel::Money;

use crate::billing::BillingDetails;
use crate::method::PaymentMethod;

/// One offending field with a human-readable message
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Request rejected before reaching a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub details: Vec<FieldError>,
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    pub fn new() -> Self {
        Self {
            details: Vec::new(),
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.details.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut error = Self::new();
        error.push(field, message);
        error
    }

    pub fn is_empty(&self) -> bool {
        self.details.is_empty()
    }

    /// Returns Ok(()) when no field errors were collected
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Default for ValidationError {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed on {} field(s)", self.details.len())?;
        for detail in &self.details {
            write!(f, "; {}: {}", detail.field, detail.message)?;
        }
        Ok(())
    }
}

/// Validates a create-payment request against the schema for its method
pub fn validate_create(
    amount: &Money,
    method: PaymentMethod,
    billing: &BillingDetails,
) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();

    if !amount.is_positive() {
        errors.push("amount", "must be greater than zero");
    }

    if billing.name.trim().is_empty() {
        errors.push("billing_details.name", "must not be empty");
    }
    if !billing.email.validate_email() {
        errors.push("billing_details.email", "must be a valid email address");
    }

    match method {
        PaymentMethod::BankTransfer => match &billing.bank_transfer {
            Some(details) => {
                if details.beneficiary_name.trim().is_empty() {
                    errors.push(
                        "billing_details.bank_transfer.beneficiary_name",
                        "must not be empty",
                    );
                }
                if !is_valid_clabe(&details.beneficiary_clabe) {
                    errors.push(
                        "billing_details.bank_transfer.beneficiary_clabe",
                        "must be an 18-digit CLABE with a valid check digit",
                    );
                }
                if !is_all_digits(&details.institution_code, 5) {
                    errors.push(
                        "billing_details.bank_transfer.institution_code",
                        "must be a 5-digit institution code",
                    );
                }
            }
            None => errors.push(
                "billing_details.bank_transfer",
                "required for bank transfers",
            ),
        },
        PaymentMethod::BillPayment => match &billing.bill_payment {
            Some(details) => {
                if !is_all_digits(&details.agreement_code, 7) {
                    errors.push(
                        "billing_details.bill_payment.agreement_code",
                        "must be a 7-digit agreement code",
                    );
                }
                let reference = &details.reference;
                if reference.len() < 4
                    || reference.len() > 30
                    || !reference.chars().all(|c| c.is_ascii_alphanumeric())
                {
                    errors.push(
                        "billing_details.bill_payment.reference",
                        "must be 4-30 alphanumeric characters",
                    );
                }
            }
            None => errors.push(
                "billing_details.bill_payment",
                "required for bill payments",
            ),
        },
        PaymentMethod::Card | PaymentMethod::CashVoucher | PaymentMethod::Wallet => {}
    }

    errors.into_result()
}

fn is_all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

/// Validates an 18-digit CLABE including its check digit
///
/// The check digit is computed over the first 17 digits with the 3-7-1
/// weight cycle, each product reduced mod 10.
pub fn is_valid_clabe(clabe: &str) -> bool {
    if !is_all_digits(clabe, 18) {
        return false;
    }

    const WEIGHTS: [u32; 3] = [3, 7, 1];
    let digits: Vec<u32> = clabe.bytes().map(|b| (b - b'0') as u32).collect();

    let sum: u32 = digits[..17]
        .iter()
        .enumerate()
        .map(|(i, d)| (d * WEIGHTS[i % 3]) % 10)
        .sum();

    digits[17] == (10 - sum % 10) % 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{BankTransferDetails, BillPaymentDetails, BillService};
    use core_kernel::{Currency, Money};
    use rust_decimal_macros::dec;

    fn base_billing() -> BillingDetails {
        BillingDetails::new("Ana Torres", "ana@example.com")
    }

    fn mxn(amount: rust_decimal::Decimal) -> Money {
        Money::new(amount, Currency::MXN)
    }

    #[test]
    fn test_valid_card_request() {
        let result = validate_create(&mxn(dec!(1000)), PaymentMethod::Card, &base_billing());
        assert!(result.is_ok());
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let error =
            validate_create(&mxn(dec!(0)), PaymentMethod::Card, &base_billing()).unwrap_err();
        assert!(error.details.iter().any(|d| d.field == "amount"));
    }

    #[test]
    fn test_rejects_bad_email() {
        let billing = BillingDetails::new("Ana Torres", "not-an-email");
        let error = validate_create(&mxn(dec!(100)), PaymentMethod::Card, &billing).unwrap_err();
        assert!(error
            .details
            .iter()
            .any(|d| d.field == "billing_details.email"));
    }

    #[test]
    fn test_clabe_check_digit() {
        assert!(is_valid_clabe("032180000118359719"));
        assert!(is_valid_clabe("646180110400000007"));
        // Wrong check digit
        assert!(!is_valid_clabe("032180000118359710"));
        // Wrong length / non-digits
        assert!(!is_valid_clabe("03218000011835971"));
        assert!(!is_valid_clabe("03218000011835971X"));
    }

    #[test]
    fn test_bank_transfer_requires_block() {
        let error = validate_create(&mxn(dec!(100)), PaymentMethod::BankTransfer, &base_billing())
            .unwrap_err();
        assert_eq!(error.details.len(), 1);
        assert_eq!(error.details[0].field, "billing_details.bank_transfer");
    }

    #[test]
    fn test_bank_transfer_field_schema() {
        let billing = base_billing().with_bank_transfer(BankTransferDetails {
            beneficiary_name: "Escuela Aula".into(),
            beneficiary_clabe: "032180000118359719".into(),
            institution_code: "40012".into(),
        });
        assert!(validate_create(&mxn(dec!(100)), PaymentMethod::BankTransfer, &billing).is_ok());

        let billing = base_billing().with_bank_transfer(BankTransferDetails {
            beneficiary_name: "".into(),
            beneficiary_clabe: "032180000118359710".into(),
            institution_code: "4001".into(),
        });
        let error =
            validate_create(&mxn(dec!(100)), PaymentMethod::BankTransfer, &billing).unwrap_err();
        assert_eq!(error.details.len(), 3);
    }

    #[test]
    fn test_bill_payment_field_schema() {
        let billing = base_billing().with_bill_payment(BillPaymentDetails {
            service: BillService::Electricity,
            agreement_code: "1234567".into(),
            reference: "REF001234".into(),
        });
        assert!(validate_create(&mxn(dec!(100)), PaymentMethod::BillPayment, &billing).is_ok());

        let billing = base_billing().with_bill_payment(BillPaymentDetails {
            service: BillService::Water,
            agreement_code: "12345".into(),
            // Too short and non-alphanumeric
            reference: "a-b".into(),
        });
        let error =
            validate_create(&mxn(dec!(100)), PaymentMethod::BillPayment, &billing).unwrap_err();
        assert_eq!(error.details.len(), 2);
    }

    #[test]
    fn test_no_partial_detail_loss() {
        // Several violations surface together, not just the first
        let billing = BillingDetails::new("", "bad");
        let error = validate_create(&mxn(dec!(-5)), PaymentMethod::Card, &billing).unwrap_err();
        assert_eq!(error.details.len(), 3);
    }
}
