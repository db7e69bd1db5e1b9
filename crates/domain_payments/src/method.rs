//! Payment methods, purposes, and provider routing

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the payer settles the payment
///
/// The method is immutable after creation and determines which provider
/// adapter the record is bound to for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Credit or debit card
    Card,
    /// Cash voucher paid at a convenience store
    CashVoucher,
    /// Interbank (SPEI) transfer to a CLABE account
    BankTransfer,
    /// Wallet-based checkout
    Wallet,
    /// Utility/service bill paid against an agreement code
    BillPayment,
}

impl PaymentMethod {
    /// The provider that processes this method
    pub fn provider(&self) -> ProviderName {
        match self {
            PaymentMethod::Card | PaymentMethod::CashVoucher => ProviderName::Conekta,
            PaymentMethod::Wallet => ProviderName::MercadoPago,
            PaymentMethod::BankTransfer | PaymentMethod::BillPayment => ProviderName::Stp,
        }
    }

    /// Whether refunds are supported for this method
    ///
    /// Cash vouchers and bill payments settle out-of-band and cannot be
    /// reversed through the originating provider.
    pub fn supports_refunds(&self) -> bool {
        match self {
            PaymentMethod::Card | PaymentMethod::Wallet | PaymentMethod::BankTransfer => true,
            PaymentMethod::CashVoucher | PaymentMethod::BillPayment => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::CashVoucher => "cash_voucher",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::BillPayment => "bill_payment",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentMethod> {
        match s {
            "card" => Some(PaymentMethod::Card),
            "cash_voucher" => Some(PaymentMethod::CashVoucher),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "wallet" => Some(PaymentMethod::Wallet),
            "bill_payment" => Some(PaymentMethod::BillPayment),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The external payment networks the core integrates with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderName {
    /// Card and cash-voucher processor
    Conekta,
    /// Wallet checkout processor
    MercadoPago,
    /// Domestic interbank-transfer and bill-payment network
    Stp,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Conekta => "conekta",
            ProviderName::MercadoPago => "mercado_pago",
            ProviderName::Stp => "stp",
        }
    }

    pub fn parse(s: &str) -> Option<ProviderName> {
        match s {
            "conekta" => Some(ProviderName::Conekta),
            "mercado_pago" => Some(ProviderName::MercadoPago),
            "stp" => Some(ProviderName::Stp),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque reference to the thing being paid for
///
/// The core passes this through as metadata and does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purpose {
    /// Kind of item (e.g., "course", "webinar", "subscription", "utility_bill")
    #[serde(rename = "type")]
    pub kind: String,
    /// Identifier of the item in the owning service
    pub item_id: String,
}

impl Purpose {
    pub fn new(kind: impl Into<String>, item_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            item_id: item_id.into(),
        }
    }
}

/// Method-specific details supplied at confirmation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MethodDetails {
    /// Nothing extra needed (vouchers, transfers, bill payments)
    None,
    /// Tokenized card reference from the client-side tokenizer
    CardToken { token: String },
    /// Wallet authorization code returned by the checkout redirect
    WalletAuthorization { authorization_code: String },
}

impl Default for MethodDetails {
    fn default() -> Self {
        MethodDetails::None
    }
}
