//! Session and participant state machines.
//!
//! ```text
//!              START              PAUSE
//! ┌───────────┐     ┌──────────┐ ──────► ┌──────────┐
//! │ SCHEDULED ├────►│  ACTIVE  │         │  PAUSED  │
//! └─────┬─────┘     └────┬─────┘ ◄────── └────┬─────┘
//!       │ CANCEL         │ COMPLETE  RESUME   │ COMPLETE
//!       ▼                ▼                    │
//! ┌───────────┐     ┌───────────┐             │
//! │ CANCELLED │     │ COMPLETED │◄────────────┘
//! └───────────┘     └───────────┘
//! ```
//!
//! Both terminal states are absorbing. The functions here are pure; the
//! engine applies their results inside a store transaction.

use crate::error::LedgerError;
use pitboss_proto::{ParticipantStatus, SessionAction, SessionStatus};

/// Status reached by applying `action` to a session in `from`.
pub fn next_status(from: SessionStatus, action: SessionAction) -> Result<SessionStatus, LedgerError> {
    use SessionAction as A;
    use SessionStatus as S;

    match (from, action) {
        (S::Scheduled, A::Start) => Ok(S::Active),
        (S::Active, A::Pause) => Ok(S::Paused),
        (S::Paused, A::Resume) => Ok(S::Active),
        (S::Active | S::Paused, A::Complete) => Ok(S::Completed),
        (S::Scheduled, A::Cancel) => Ok(S::Cancelled),
        _ => Err(LedgerError::InvalidTransition { from, action }),
    }
}

/// Which kinds of mutation a session status admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Contributions, seeded additions and top-up approvals.
    Contribution,
    /// Cash-outs.
    Withdrawal,
    /// Signed adjustments of the contributed total.
    Correction,
    /// Invitations, explicit participant status changes, top-up requests.
    Roster,
}

/// Fails with `SessionNotMutable` when `status` does not admit `mutation`.
pub fn ensure_mutable(status: SessionStatus, mutation: Mutation) -> Result<(), LedgerError> {
    use SessionStatus as S;

    let allowed = match mutation {
        Mutation::Contribution => matches!(status, S::Scheduled | S::Active),
        Mutation::Withdrawal | Mutation::Roster => {
            matches!(status, S::Scheduled | S::Active | S::Paused)
        }
        Mutation::Correction => status != S::Cancelled,
    };
    if allowed {
        Ok(())
    } else {
        Err(LedgerError::SessionNotMutable(status))
    }
}

/// Validate an explicit operator-driven participant status change.
///
/// Only `ACTIVE`, `SITTING_OUT` and `ELIMINATED` can be set directly;
/// `INVITED -> ACTIVE` happens through a contribution and `CASHED_OUT`
/// through a withdrawal or settlement. Setting the current status is a no-op.
pub fn participant_change(
    from: ParticipantStatus,
    to: ParticipantStatus,
) -> Result<ParticipantStatus, LedgerError> {
    use ParticipantStatus as P;

    match (from, to) {
        (a, b) if a == b && a != P::CashedOut => Ok(b),
        (P::Active, P::SittingOut)
        | (P::SittingOut, P::Active)
        | (P::Active | P::SittingOut, P::Eliminated) => Ok(to),
        _ => Err(LedgerError::InvalidStatusChange { from, to }),
    }
}
