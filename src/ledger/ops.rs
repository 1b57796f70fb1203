//! Pure aggregate arithmetic for participant records.
//!
//! Each function takes the current record and returns the record the
//! matching ledger transaction produces. Nothing here touches the store.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use pitboss_proto::{
    ParticipantId, ParticipantRecord, ParticipantStatus, SessionId, SessionStats, SettlementLine,
};
use rust_decimal::Decimal;

/// Highest supported session precision.
pub const MAX_PRECISION: u32 = 8;

/// Rescale `amount` to `precision` decimal places, rejecting values that
/// would lose digits.
pub fn at_precision(amount: Decimal, precision: u32) -> Result<Decimal, LedgerError> {
    if amount.normalize().scale() > precision {
        return Err(LedgerError::InvalidAmount(format!(
            "{amount} has more than {precision} decimal places"
        )));
    }
    let mut scaled = amount;
    scaled.rescale(precision);
    Ok(scaled)
}

pub fn positive(amount: Decimal, precision: u32) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!("{amount} must be positive")));
    }
    at_precision(amount, precision)
}

pub fn non_negative(amount: Decimal, precision: u32) -> Result<Decimal, LedgerError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(LedgerError::InvalidAmount(format!("{amount} must not be negative")));
    }
    at_precision(amount.abs(), precision)
}

fn overflow(what: &str) -> LedgerError {
    LedgerError::InvalidAmount(format!("{what} exceeds the supported range"))
}

pub fn non_zero(amount: Decimal, precision: u32) -> Result<Decimal, LedgerError> {
    if amount.is_zero() {
        return Err(LedgerError::InvalidAmount("correction amount must not be zero".into()));
    }
    at_precision(amount, precision)
}

/// A fresh record with nothing contributed.
pub fn blank(
    session_id: SessionId,
    participant_id: ParticipantId,
    status: ParticipantStatus,
    precision: u32,
    now: DateTime<Utc>,
) -> ParticipantRecord {
    ParticipantRecord {
        session_id,
        participant_id,
        status,
        contributed: Decimal::new(0, precision),
        withdrawn: None,
        final_balance: None,
        joined_at: now,
        left_at: None,
    }
}

/// Add a contribution (or seed). Re-activates invited, sitting-out and
/// eliminated participants.
pub fn contribute(
    mut record: ParticipantRecord,
    amount: Decimal,
) -> Result<ParticipantRecord, LedgerError> {
    if record.status == ParticipantStatus::CashedOut {
        return Err(LedgerError::AlreadySettled(record.participant_id));
    }
    record.contributed = record
        .contributed
        .checked_add(amount)
        .ok_or_else(|| overflow("contributed total"))?;
    record.status = ParticipantStatus::Active;
    Ok(record)
}

/// Cash a participant out for `amount`.
pub fn withdraw(
    mut record: ParticipantRecord,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<ParticipantRecord, LedgerError> {
    if record.status == ParticipantStatus::CashedOut {
        return Err(LedgerError::AlreadySettled(record.participant_id));
    }
    let final_balance = amount
        .checked_sub(record.contributed)
        .ok_or_else(|| overflow("final balance"))?;
    record.withdrawn = Some(amount);
    record.final_balance = Some(final_balance);
    record.status = ParticipantStatus::CashedOut;
    record.left_at = Some(now);
    Ok(record)
}

/// Apply a signed correction to the contributed total.
///
/// The final balance of a cashed-out participant is fixed at withdrawal and
/// is left as it was.
pub fn correct(
    mut record: ParticipantRecord,
    amount: Decimal,
) -> Result<ParticipantRecord, LedgerError> {
    let contributed = record
        .contributed
        .checked_add(amount)
        .ok_or_else(|| overflow("contributed total"))?;
    if contributed.is_sign_negative() && !contributed.is_zero() {
        return Err(LedgerError::InvalidAmount(format!(
            "correction would make contributed negative ({contributed})"
        )));
    }
    record.contributed = contributed;
    Ok(record)
}

/// Settle an open participant at completion: they take out exactly what
/// they put in.
pub fn settle(mut record: ParticipantRecord, now: DateTime<Utc>) -> ParticipantRecord {
    record.withdrawn = Some(record.contributed);
    record.final_balance = Some(record.contributed - record.contributed);
    record.status = ParticipantStatus::CashedOut;
    record.left_at = Some(now);
    record
}

pub fn settlement_line(record: &ParticipantRecord) -> SettlementLine {
    let withdrawn = record.withdrawn.unwrap_or(record.contributed);
    SettlementLine {
        participant_id: record.participant_id,
        contributed: record.contributed,
        withdrawn,
        final_balance: record.final_balance.unwrap_or(withdrawn - record.contributed),
    }
}

/// Sum amounts, failing instead of panicking when the total leaves the
/// decimal range.
pub fn checked_total(
    amounts: impl IntoIterator<Item = Decimal>,
    what: &str,
) -> Result<Decimal, LedgerError> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, amount| acc.checked_add(amount))
        .ok_or_else(|| overflow(what))
}

/// Aggregate figures over a session's participants.
pub fn stats(participants: &[ParticipantRecord]) -> Result<SessionStats, LedgerError> {
    Ok(SessionStats {
        total_contributed: checked_total(
            participants.iter().map(|p| p.contributed),
            "session contributed total",
        )?,
        total_withdrawn: checked_total(
            participants.iter().filter_map(|p| p.withdrawn),
            "session withdrawn total",
        )?,
        active_participants: participants
            .iter()
            .filter(|p| {
                matches!(
                    p.status,
                    ParticipantStatus::Active | ParticipantStatus::SittingOut
                )
            })
            .count(),
        total_participants: participants.len(),
    })
}
