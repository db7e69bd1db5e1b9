//! Core Kernel - Foundational types for the payment orchestration system
//!
//! This crate provides the fundamental building blocks used across all domain
//! modules:
//! - Money types with precise decimal arithmetic
//! - Strongly-typed identifiers

pub mod identifiers;
pub mod money;

pub use identifiers::{PaymentId, RefundId, UserId, WebhookEventId};
pub use money::{Currency, Money, MoneyError};
