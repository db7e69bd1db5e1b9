//! Provider gateway implementations
//!
//! Three side-by-side implementations of the
//! [`domain_payments::ProviderGateway`] contract, one per external payment
//! network:
//!
//! - [`conekta`]: card and cash-voucher processor (bearer API key, HMAC
//!   webhook digests)
//! - [`mercado_pago`]: wallet checkout (bearer token, timestamped HMAC
//!   webhook signatures)
//! - [`stp`]: interbank-transfer and bill-payment network (RSA-signed
//!   orders, HMAC webhook signatures)
//!
//! Each gateway owns its own request-signing concern; nothing
//! provider-specific crosses the trait boundary.

pub mod conekta;
pub mod mercado_pago;
pub mod stp;

mod http;
mod signature;

pub use conekta::{ConektaConfig, ConektaGateway};
pub use mercado_pago::{MercadoPagoConfig, MercadoPagoGateway};
pub use stp::{StpConfig, StpGateway};
