//! Canonical payment lifecycle states
//!
//! Every provider's native status vocabulary is mapped into this 6-value
//! enumeration. Status writes are monotonic: a write only takes effect when
//! it represents further lifecycle progress than the stored value, so late
//! or duplicated reports from any source (confirm, webhook, poll) can never
//! regress a record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical payment status
///
/// Lifecycle: `Pending -> Processing -> Completed | Failed | Cancelled`,
/// with the refund branch `Completed -> Refunded` once the full amount has
/// been refunded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Record created, no provider intent confirmed yet
    Pending,
    /// Intent created and/or confirmed, awaiting provider finality
    Processing,
    /// Provider reported the payment as captured
    Completed,
    /// Provider reported the payment as declined or errored
    Failed,
    /// Payment was cancelled or expired before capture
    Cancelled,
    /// The full amount has been refunded
    Refunded,
}

impl PaymentStatus {
    /// Position of this status in the lifecycle order
    ///
    /// The three terminal outcomes share a rank: none of them is "further
    /// along" than another, so a late `failed` report can never overwrite
    /// `completed` and vice versa.
    pub fn lifecycle_rank(&self) -> u8 {
        match self {
            PaymentStatus::Pending => 0,
            PaymentStatus::Processing => 1,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Cancelled => 2,
            PaymentStatus::Refunded => 3,
        }
    }

    /// Returns true if no further forward transition exists except the
    /// refund branch from `Completed`
    pub fn is_terminal(&self) -> bool {
        self.lifecycle_rank() >= 2
    }

    /// Returns true if writing `next` over `self` represents forward
    /// lifecycle progress
    pub fn advances_to(&self, next: PaymentStatus) -> bool {
        next.lifecycle_rank() > self.lifecycle_rank()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<PaymentStatus> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_progress() {
        assert!(PaymentStatus::Pending.advances_to(PaymentStatus::Processing));
        assert!(PaymentStatus::Processing.advances_to(PaymentStatus::Completed));
        assert!(PaymentStatus::Completed.advances_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_no_regression() {
        assert!(!PaymentStatus::Completed.advances_to(PaymentStatus::Processing));
        assert!(!PaymentStatus::Processing.advances_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Processing.advances_to(PaymentStatus::Processing));
    }

    #[test]
    fn test_terminal_outcomes_do_not_overwrite_each_other() {
        assert!(!PaymentStatus::Completed.advances_to(PaymentStatus::Failed));
        assert!(!PaymentStatus::Failed.advances_to(PaymentStatus::Completed));
        assert!(!PaymentStatus::Cancelled.advances_to(PaymentStatus::Completed));
    }

    #[test]
    fn test_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("settled"), None);
    }
}
