//! Ledger operations and their receipts.
//!
//! An [`Operation`] is what a caller submits to the ledger engine; a
//! [`Receipt`] is what it gets back once the operation has been committed.
//! Both travel inside `SUBMIT` / `SUBMIT_RESULT` frames, tagged by `"op"`
//! and `"kind"` respectively.

use crate::model::{
    ParticipantId, ParticipantRecord, ParticipantStatus, SessionId, SessionRecord,
    SettlementLine, TopUpRequest, Transaction,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

wire_enum! {
    /// Lifecycle action requested against a session.
    SessionAction {
        /// `SCHEDULED -> ACTIVE`.
        Start => "START",
        /// `ACTIVE -> PAUSED`.
        Pause => "PAUSE",
        /// `PAUSED -> ACTIVE`.
        Resume => "RESUME",
        /// `ACTIVE | PAUSED -> COMPLETED`, settling every open participant.
        Complete => "COMPLETE",
        /// `SCHEDULED -> CANCELLED`.
        Cancel => "CANCEL",
    }
}

/// A mutation submitted to the ledger engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Create a `SCHEDULED` session owned by the caller.
    CreateSession {
        /// Unit buy-in.
        buy_in: Decimal,
        /// Decimal places kept for every amount.
        precision: u32,
        /// ISO currency code.
        currency: String,
        /// Announced start time.
        #[serde(default)]
        scheduled_start: Option<DateTime<Utc>>,
    },
    /// Apply a lifecycle action.
    Transition {
        /// Target session.
        session_id: SessionId,
        /// Requested action.
        action: SessionAction,
    },
    /// Create `INVITED` records for participants not yet in the session.
    InviteParticipants {
        /// Target session.
        session_id: SessionId,
        /// Participants to invite.
        participant_ids: Vec<ParticipantId>,
    },
    /// Add a participant mid-session with an implicit buy-in.
    AddParticipant {
        /// Target session.
        session_id: SessionId,
        /// Participant to add.
        participant_id: ParticipantId,
    },
    /// Record money put in by a participant.
    RecordContribution {
        /// Target session.
        session_id: SessionId,
        /// Contributing participant.
        participant_id: ParticipantId,
        /// Positive amount.
        amount: Decimal,
        /// Optional note.
        #[serde(default)]
        note: Option<String>,
    },
    /// Cash a participant out.
    RecordWithdrawal {
        /// Target session.
        session_id: SessionId,
        /// Withdrawing participant.
        participant_id: ParticipantId,
        /// Non-negative amount taken out.
        amount: Decimal,
    },
    /// Adjust a participant's contributed total.
    RecordCorrection {
        /// Target session.
        session_id: SessionId,
        /// Corrected participant.
        participant_id: ParticipantId,
        /// Signed, non-zero adjustment.
        amount: Decimal,
        /// Mandatory explanation.
        reason: String,
    },
    /// Explicitly move a participant to `ACTIVE`, `SITTING_OUT` or `ELIMINATED`.
    SetParticipantStatus {
        /// Target session.
        session_id: SessionId,
        /// Target participant.
        participant_id: ParticipantId,
        /// New status.
        status: ParticipantStatus,
    },
    /// Ask the operator for a top-up. Submitted by the participant.
    RequestTopUp {
        /// Target session.
        session_id: SessionId,
        /// Requested amount.
        amount: Decimal,
    },
    /// Approve or decline a pending top-up request.
    ResolveTopUp {
        /// Target session.
        session_id: SessionId,
        /// Request to resolve.
        request_id: i64,
        /// `true` records a contribution, `false` declines.
        approve: bool,
    },
}

impl Operation {
    /// Session the operation targets; `None` for session creation.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Operation::CreateSession { .. } => None,
            Operation::Transition { session_id, .. }
            | Operation::InviteParticipants { session_id, .. }
            | Operation::AddParticipant { session_id, .. }
            | Operation::RecordContribution { session_id, .. }
            | Operation::RecordWithdrawal { session_id, .. }
            | Operation::RecordCorrection { session_id, .. }
            | Operation::SetParticipantStatus { session_id, .. }
            | Operation::RequestTopUp { session_id, .. }
            | Operation::ResolveTopUp { session_id, .. } => Some(*session_id),
        }
    }

    /// Short lowercase name, used for logging and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateSession { .. } => "create_session",
            Operation::Transition { .. } => "transition",
            Operation::InviteParticipants { .. } => "invite_participants",
            Operation::AddParticipant { .. } => "add_participant",
            Operation::RecordContribution { .. } => "record_contribution",
            Operation::RecordWithdrawal { .. } => "record_withdrawal",
            Operation::RecordCorrection { .. } => "record_correction",
            Operation::SetParticipantStatus { .. } => "set_participant_status",
            Operation::RequestTopUp { .. } => "request_top_up",
            Operation::ResolveTopUp { .. } => "resolve_top_up",
        }
    }
}

/// Result of a committed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(clippy::large_enum_variant)]
pub enum Receipt {
    /// A session was created.
    Session {
        /// The new session.
        session: SessionRecord,
    },
    /// A lifecycle action was applied.
    Transition {
        /// Session after the transition.
        session: SessionRecord,
        /// Settlement lines; non-empty only on completion.
        settlement: Vec<SettlementLine>,
    },
    /// Participants were invited.
    Invitation {
        /// Newly created records.
        invited: Vec<ParticipantRecord>,
        /// Ids that already had a record.
        skipped: Vec<ParticipantId>,
    },
    /// A ledger transaction was appended.
    Transaction {
        /// The new entry.
        transaction: Transaction,
        /// Participant aggregate after the entry.
        participant: ParticipantRecord,
    },
    /// A participant's status changed.
    Participant {
        /// Updated record.
        participant: ParticipantRecord,
    },
    /// A top-up request was created or resolved.
    TopUp {
        /// The request.
        request: TopUpRequest,
        /// Contribution recorded on approval.
        transaction: Option<Transaction>,
    },
}
