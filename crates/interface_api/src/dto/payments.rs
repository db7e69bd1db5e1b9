//! Payment request/response data transfer objects

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use core_kernel::{Currency, Money};
use domain_payments::{
    Address, BankTransferDetails, BillPaymentDetails, BillService, BillingDetails, MethodDetails,
    PaymentMethod, PaymentRecord, Purpose, RefundEntry, RefundState, ValidationError,
};

/// Body of a create-payment request
#[derive(Debug, Deserialize)]
pub struct CreatePaymentBody {
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub purpose: PurposeBody,
    pub billing_details: BillingDetailsBody,
}

#[derive(Debug, Deserialize)]
pub struct PurposeBody {
    #[serde(rename = "type")]
    pub kind: String,
    pub item_id: String,
}

#[derive(Debug, Deserialize)]
pub struct BillingDetailsBody {
    pub name: String,
    pub email: String,
    pub address: Option<Address>,
    pub bank_transfer: Option<BankTransferBody>,
    pub bill_payment: Option<BillPaymentBody>,
}

#[derive(Debug, Deserialize)]
pub struct BankTransferBody {
    pub beneficiary_name: String,
    pub beneficiary_clabe: String,
    pub institution_code: String,
}

#[derive(Debug, Deserialize)]
pub struct BillPaymentBody {
    pub service: String,
    pub agreement_code: String,
    pub reference: String,
}

/// Parsed create-payment request pieces
pub struct ParsedCreatePayment {
    pub amount: Money,
    pub method: PaymentMethod,
    pub purpose: Purpose,
    pub billing: BillingDetails,
}

impl CreatePaymentBody {
    /// Parses enumerated fields, collecting field-level errors
    ///
    /// Amount/format constraints beyond enumeration membership are the
    /// domain validator's job; this only lifts strings into domain types.
    pub fn parse(self) -> Result<ParsedCreatePayment, ValidationError> {
        let mut errors = ValidationError::new();

        let currency = Currency::parse(&self.currency);
        if currency.is_none() {
            errors.push("currency", "unsupported currency");
        }
        let method = PaymentMethod::parse(&self.payment_method);
        if method.is_none() {
            errors.push("payment_method", "unknown payment method");
        }

        let bill_payment = match self.billing_details.bill_payment {
            Some(bill) => match BillService::parse(&bill.service) {
                Some(service) => Some(BillPaymentDetails {
                    service,
                    agreement_code: bill.agreement_code,
                    reference: bill.reference,
                }),
                None => {
                    errors.push(
                        "billing_details.bill_payment.service",
                        "unsupported service type",
                    );
                    None
                }
            },
            None => None,
        };

        let (currency, method) = match (currency, method) {
            (Some(currency), Some(method)) if errors.is_empty() => (currency, method),
            _ => return Err(errors),
        };

        let billing = BillingDetails {
            name: self.billing_details.name,
            email: self.billing_details.email,
            address: self.billing_details.address,
            bank_transfer: self.billing_details.bank_transfer.map(|b| {
                BankTransferDetails {
                    beneficiary_name: b.beneficiary_name,
                    beneficiary_clabe: b.beneficiary_clabe,
                    institution_code: b.institution_code,
                }
            }),
            bill_payment,
        };

        Ok(ParsedCreatePayment {
            amount: Money::new(self.amount, currency),
            method,
            purpose: Purpose::new(self.purpose.kind, self.purpose.item_id),
            billing,
        })
    }
}

/// Response to a create-payment request
#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub payment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_tracking_key: Option<String>,
}

/// Body of a confirm-payment request
#[derive(Debug, Deserialize, Default)]
pub struct ConfirmPaymentBody {
    #[serde(default)]
    pub method_details: Option<MethodDetails>,
}

/// Body of a refund request
#[derive(Debug, Deserialize)]
pub struct RefundBody {
    pub amount: Option<Decimal>,
    pub reason: String,
}

/// Projection of a payment record returned to callers
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: String,
    pub purpose: PurposeResponse,
    pub provider: ProviderResponse,
    pub refunds: Vec<RefundResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PurposeResponse {
    #[serde(rename = "type")]
    pub kind: String,
    pub item_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProviderResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FailureResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub refund_id: String,
    pub amount: Decimal,
    pub reason: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_refund_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<&RefundEntry> for RefundResponse {
    fn from(entry: &RefundEntry) -> Self {
        Self {
            refund_id: entry.id.to_string(),
            amount: entry.amount.amount(),
            reason: entry.reason.clone(),
            status: match entry.state {
                RefundState::Pending => "pending".to_string(),
                RefundState::Completed => "completed".to_string(),
                RefundState::Failed => "failed".to_string(),
            },
            external_refund_id: entry.external_refund_id.clone(),
            processed_at: entry.processed_at,
        }
    }
}

impl From<&PaymentRecord> for PaymentResponse {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            payment_id: record.id.to_string(),
            status: record.status.as_str().to_string(),
            amount: record.amount.amount(),
            currency: record.amount.currency().code().to_string(),
            payment_method: record.method.as_str().to_string(),
            purpose: PurposeResponse {
                kind: record.purpose.kind.clone(),
                item_id: record.purpose.item_id.clone(),
            },
            provider: ProviderResponse {
                name: record.provider.name.as_str().to_string(),
                external_payment_id: record.provider.external_payment_id.clone(),
                tracking_key: record.provider.tracking_key.clone(),
            },
            refunds: record.refunds.iter().map(RefundResponse::from).collect(),
            failure: record.failure.as_ref().map(|f| FailureResponse {
                code: f.code.clone(),
                message: f.message.clone(),
            }),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
