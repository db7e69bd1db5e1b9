//! Shared test utilities for the payments test suite
//!
//! - [`builders`]: builder patterns for payment records
//! - [`fixtures`]: common money, billing, and purpose fixtures
//! - [`gateway`]: a programmable provider gateway

pub mod builders;
pub mod fixtures;
pub mod gateway;

pub use builders::PaymentRecordBuilder;
pub use fixtures::{BillingFixtures, MoneyFixtures, PurposeFixtures, VALID_CLABE};
pub use gateway::{webhook_body, ScriptedGateway};
