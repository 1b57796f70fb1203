//! Ledger records as they appear on the wire.
//!
//! These are snapshots of server-side state. The server owns the canonical
//! copies; clients only ever receive them inside events, receipts or
//! snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a live session.
pub type SessionId = Uuid;

/// Identifier of an individual tracked within a session's ledger.
pub type ParticipantId = Uuid;

wire_enum! {
    /// Lifecycle status of a session.
    SessionStatus {
        /// Created, not yet running. Contributions may be pre-seeded.
        Scheduled => "SCHEDULED",
        /// Running.
        Active => "ACTIVE",
        /// Temporarily halted; may resume or complete.
        Paused => "PAUSED",
        /// Terminal. Every participant has a final balance.
        Completed => "COMPLETED",
        /// Terminal. Only reachable from `Scheduled`.
        Cancelled => "CANCELLED",
    }
}

impl SessionStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

wire_enum! {
    /// Participation status of one participant within one session.
    ParticipantStatus {
        /// Invited by the operator, nothing contributed yet.
        Invited => "INVITED",
        /// Playing.
        Active => "ACTIVE",
        /// Temporarily away from the table.
        SittingOut => "SITTING_OUT",
        /// Out of chips; a new contribution re-activates.
        Eliminated => "ELIMINATED",
        /// Settled. The final balance is fixed.
        CashedOut => "CASHED_OUT",
    }
}

wire_enum! {
    /// Kind of an immutable ledger transaction.
    TransactionKind {
        /// Money put in by the participant.
        Contribution => "CONTRIBUTION",
        /// Signed adjustment of the contributed total, with a mandatory reason.
        Correction => "CORRECTION",
        /// Cash-out; fixes the final balance.
        Withdrawal => "WITHDRAWAL",
        /// Implicit buy-in recorded when the operator adds a participant.
        Seed => "SEED",
    }
}

impl TransactionKind {
    /// Whether transactions of this kind sum into the contributed aggregate.
    pub fn counts_toward_contributed(&self) -> bool {
        matches!(self, Self::Contribution | Self::Correction | Self::Seed)
    }
}

wire_enum! {
    /// Status of a participant's top-up request.
    TopUpStatus {
        /// Waiting for the operator.
        Pending => "PENDING",
        /// Approved; a contribution was recorded.
        Approved => "APPROVED",
        /// Declined by the operator.
        Declined => "DECLINED",
    }
}

/// A session and its monetary configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier.
    pub id: SessionId,
    /// Owner; the only caller allowed to mutate the ledger.
    pub operator_id: ParticipantId,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Unit buy-in, used for seeded participants.
    pub buy_in: Decimal,
    /// Number of decimal places every amount is kept at.
    pub precision: u32,
    /// ISO currency code, informational.
    pub currency: String,
    /// Announced start time, informational.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// First time the session became active.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time; set exactly once.
    pub ended_at: Option<DateTime<Utc>>,
}

/// Cached per-participant aggregate, re-derivable from the transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    /// Session the record belongs to.
    pub session_id: SessionId,
    /// The participant.
    pub participant_id: ParticipantId,
    /// Participation status.
    pub status: ParticipantStatus,
    /// Sum of contribution, seed and correction amounts.
    pub contributed: Decimal,
    /// Amount taken out at cash-out.
    pub withdrawn: Option<Decimal>,
    /// `withdrawn - contributed`; present iff the status is `CASHED_OUT`.
    pub final_balance: Option<Decimal>,
    /// When the record was created.
    pub joined_at: DateTime<Utc>,
    /// When the participant cashed out.
    pub left_at: Option<DateTime<Utc>>,
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Monotonic identifier; commit order within a session.
    pub id: i64,
    /// Session the entry belongs to.
    pub session_id: SessionId,
    /// Participant the entry applies to.
    pub participant_id: ParticipantId,
    /// Entry kind.
    pub kind: TransactionKind,
    /// Signed amount at the session precision.
    pub amount: Decimal,
    /// Free-form note; the reason for corrections.
    pub note: Option<String>,
    /// Commit time.
    pub created_at: DateTime<Utc>,
}

/// A participant's request for an additional contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpRequest {
    /// Request identifier.
    pub id: i64,
    /// Session the request belongs to.
    pub session_id: SessionId,
    /// Requesting participant.
    pub participant_id: ParticipantId,
    /// Requested amount.
    pub amount: Decimal,
    /// Current status.
    pub status: TopUpStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Approval or decline time.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Aggregate figures for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Sum of every participant's contributed total.
    pub total_contributed: Decimal,
    /// Sum of every recorded withdrawal.
    pub total_withdrawn: Decimal,
    /// Participants currently `ACTIVE` or `SITTING_OUT`.
    pub active_participants: usize,
    /// All participant records, including invited and cashed out.
    pub total_participants: usize,
}

/// Full state of a session, sent to clients that need to resynchronize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// The session.
    pub session: SessionRecord,
    /// Every participant record.
    pub participants: Vec<ParticipantRecord>,
    /// Most recent transactions, newest first.
    pub recent_transactions: Vec<Transaction>,
    /// Pending top-up requests.
    pub pending_top_ups: Vec<TopUpRequest>,
    /// Aggregate figures.
    pub stats: SessionStats,
}

/// One participant's line in a settlement summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementLine {
    /// The participant.
    pub participant_id: ParticipantId,
    /// Contributed total at settlement.
    pub contributed: Decimal,
    /// Withdrawn amount (equal to `contributed` when settled automatically).
    pub withdrawn: Decimal,
    /// Final net balance.
    pub final_balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            SessionStatus::Scheduled,
            SessionStatus::Active,
            SessionStatus::Paused,
            SessionStatus::Completed,
            SessionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = "RUNNING".parse::<SessionStatus>().unwrap_err();
        assert_eq!(err.kind, "SessionStatus");
        assert_eq!(err.value, "RUNNING");
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&ParticipantStatus::SittingOut).unwrap();
        assert_eq!(json, "\"SITTING_OUT\"");
    }

    #[test]
    fn withdrawal_does_not_count_toward_contributed() {
        assert!(TransactionKind::Contribution.counts_toward_contributed());
        assert!(TransactionKind::Correction.counts_toward_contributed());
        assert!(TransactionKind::Seed.counts_toward_contributed());
        assert!(!TransactionKind::Withdrawal.counts_toward_contributed());
    }

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Paused.is_terminal());
    }
}
