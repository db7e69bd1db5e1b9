//! Billing details attached to a payment record
//!
//! Payer identity plus the method-specific blocks: beneficiary account and
//! institution code for interbank transfers, service agreement and reference
//! for bill payments. Validation lives in [`crate::validation`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payer name, contact, and method-specific fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    /// Required for bank transfers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_transfer: Option<BankTransferDetails>,
    /// Required for bill payments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_payment: Option<BillPaymentDetails>,
}

impl BillingDetails {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            address: None,
            bank_transfer: None,
            bill_payment: None,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_bank_transfer(mut self, details: BankTransferDetails) -> Self {
        self.bank_transfer = Some(details);
        self
    }

    pub fn with_bill_payment(mut self, details: BillPaymentDetails) -> Self {
        self.bill_payment = Some(details);
        self
    }
}

/// Postal address of the payer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    /// ISO 3166-1 alpha-2
    pub country: String,
}

/// Beneficiary data for an interbank (SPEI) transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransferDetails {
    pub beneficiary_name: String,
    /// 18-digit CLABE with a valid check digit
    pub beneficiary_clabe: String,
    /// 5-digit institution code of the receiving bank
    pub institution_code: String,
}

/// Agreement data for a service bill payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillPaymentDetails {
    pub service: BillService,
    /// 7-digit agreement (convenio) code of the service company
    pub agreement_code: String,
    /// Customer reference printed on the bill
    pub reference: String,
}

/// Service categories accepted for bill payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillService {
    Electricity,
    Water,
    Gas,
    Phone,
    Internet,
    CableTv,
}

impl BillService {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillService::Electricity => "electricity",
            BillService::Water => "water",
            BillService::Gas => "gas",
            BillService::Phone => "phone",
            BillService::Internet => "internet",
            BillService::CableTv => "cable_tv",
        }
    }

    pub fn parse(s: &str) -> Option<BillService> {
        match s {
            "electricity" => Some(BillService::Electricity),
            "water" => Some(BillService::Water),
            "gas" => Some(BillService::Gas),
            "phone" => Some(BillService::Phone),
            "internet" => Some(BillService::Internet),
            "cable_tv" => Some(BillService::CableTv),
            _ => None,
        }
    }
}

impl fmt::Display for BillService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
