//! Database infrastructure layer
//!
//! SQLx/PostgreSQL implementation of the payment store port. Monotonic
//! status writes are expressed as conditional UPDATEs guarded on the stored
//! lifecycle rank; refund reservations lock the payment row and re-check
//! the balance inside one transaction.

pub mod error;
pub mod pool;
pub mod repositories;

pub use error::DatabaseError;
pub use pool::{create_pool, run_migrations, DatabaseConfig, DatabasePool};
pub use repositories::PgPaymentStore;
