//! Admin validation: a human approval gate applied after payment success.

use chrono::{DateTime, Utc};
use common::BookingId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State of the admin approval gate on a booking.
///
/// `Pending → Approved` or `Pending → Rejected`, terminal in both
/// directions; there is no re-review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValidationStatus {
    /// Awaiting an admin decision (or payment, before the gate opens).
    #[default]
    Pending,

    /// Approved for fulfillment.
    Approved,

    /// Rejected; a business signal only, the booking stays confirmed.
    Rejected,
}

impl ValidationStatus {
    /// Returns true if a decision can still be recorded.
    pub fn can_decide(&self) -> bool {
        matches!(self, ValidationStatus::Pending)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "Pending",
            ValidationStatus::Approved => "Approved",
            ValidationStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The reviewer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    /// The validation status this decision resolves to.
    pub fn resulting_status(&self) -> ValidationStatus {
        match self {
            Decision::Approve => ValidationStatus::Approved,
            Decision::Reject => ValidationStatus::Rejected,
        }
    }
}

/// One-to-one with a booking once payment succeeds.
///
/// Opened automatically (decision fields empty) when the booking reaches
/// `Paid`; immutable once a decision is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    /// The booking under review.
    pub booking_id: BookingId,
    /// Reviewer who decided, once decided.
    pub reviewer_id: Option<Uuid>,
    /// The verdict, once decided.
    pub decision: Option<Decision>,
    /// Free-text review notes.
    pub notes: Option<String>,
    /// When the gate opened (payment success).
    pub opened_at: DateTime<Utc>,
    /// When the decision was recorded.
    pub decided_at: Option<DateTime<Utc>>,
}

impl ValidationRecord {
    /// Opens an undecided record for a freshly paid booking.
    pub fn open(booking_id: BookingId, at: DateTime<Utc>) -> Self {
        Self {
            booking_id,
            reviewer_id: None,
            decision: None,
            notes: None,
            opened_at: at,
            decided_at: None,
        }
    }

    /// Returns true if a decision has been recorded.
    pub fn is_decided(&self) -> bool {
        self.decision.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_default_and_decidable() {
        assert_eq!(ValidationStatus::default(), ValidationStatus::Pending);
        assert!(ValidationStatus::Pending.can_decide());
        assert!(!ValidationStatus::Approved.can_decide());
        assert!(!ValidationStatus::Rejected.can_decide());
    }

    #[test]
    fn decision_maps_to_status() {
        assert_eq!(
            Decision::Approve.resulting_status(),
            ValidationStatus::Approved
        );
        assert_eq!(
            Decision::Reject.resulting_status(),
            ValidationStatus::Rejected
        );
    }

    #[test]
    fn open_record_is_undecided() {
        let record = ValidationRecord::open(BookingId::new(), Utc::now());
        assert!(!record.is_decided());
        assert!(record.reviewer_id.is_none());
        assert!(record.decided_at.is_none());
    }

    #[test]
    fn decision_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Decision::Approve).unwrap(), "\"approve\"");
        assert_eq!(serde_json::to_string(&Decision::Reject).unwrap(), "\"reject\"");
    }
}
