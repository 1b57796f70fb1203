//! The ledger engine.
//!
//! Every mutation runs under the session's lock, inside one SQLite
//! transaction, and publishes exactly one [`LedgerEvent`] after commit while
//! the lock is still held. Rooms therefore observe events in commit order.
//! A failed operation writes nothing and publishes nothing.

use super::events::{EventSink, LedgerEvent};
use super::machine::{self, Mutation};
use super::ops;
use crate::db::{
    Database, NotificationKind, OutboxRepository, ParticipantRepository, SessionRepository,
    TopUpRepository, TransactionRepository,
};
use crate::error::LedgerError;
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use pitboss_proto::{
    Operation, ParticipantId, ParticipantRecord, ParticipantStatus, Receipt, SessionAction,
    SessionId, SessionRecord, SessionSnapshot, SessionStatus, SettlementLine, TopUpRequest,
    TopUpStatus, Transaction, TransactionKind,
};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqliteConnection;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Current time truncated to the millisecond precision of the store.
fn now() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(now.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(now)
}

/// Serializes mutations per session and owns the path to the store.
pub struct LedgerEngine {
    db: Database,
    locks: Arc<DashMap<SessionId, Arc<Mutex<()>>>>,
    sink: Arc<dyn EventSink>,
    snapshot_transactions: u32,
}

/// Holds a session's critical section. Dropping it releases the lock and
/// forgets the mutex once nobody else is waiting on it.
struct SessionLock {
    session_id: SessionId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<SessionId, Arc<Mutex<()>>>>,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// A mutation in progress: the session lock plus its open transaction.
struct Mutating {
    tx: sqlx::Transaction<'static, sqlx::Sqlite>,
    session: SessionRecord,
    lock: SessionLock,
}

impl LedgerEngine {
    pub fn new(db: Database, sink: Arc<dyn EventSink>, snapshot_transactions: u32) -> Self {
        Self {
            db,
            locks: Arc::new(DashMap::new()),
            sink,
            snapshot_transactions,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Apply a submitted operation on behalf of `caller`.
    #[instrument(skip(self, operation, caller), fields(op = operation.name(), caller = %caller))]
    pub async fn submit(
        &self,
        operation: Operation,
        caller: ParticipantId,
    ) -> Result<Receipt, LedgerError> {
        let name = operation.name();
        let session_id = operation.session_id();

        let result = match operation {
            Operation::CreateSession {
                buy_in,
                precision,
                currency,
                scheduled_start,
            } => self
                .create_session(caller, buy_in, precision, &currency, scheduled_start)
                .await
                .map(|session| Receipt::Session { session }),
            Operation::Transition { session_id, action } => self
                .transition(caller, session_id, action)
                .await
                .map(|(session, settlement)| Receipt::Transition {
                    session,
                    settlement,
                }),
            Operation::InviteParticipants {
                session_id,
                participant_ids,
            } => self
                .invite_participants(caller, session_id, &participant_ids)
                .await
                .map(|(invited, skipped)| Receipt::Invitation { invited, skipped }),
            Operation::AddParticipant {
                session_id,
                participant_id,
            } => self
                .add_participant(caller, session_id, participant_id)
                .await
                .map(|(transaction, participant)| Receipt::Transaction {
                    transaction,
                    participant,
                }),
            Operation::RecordContribution {
                session_id,
                participant_id,
                amount,
                note,
            } => self
                .record_contribution(caller, session_id, participant_id, amount, note)
                .await
                .map(|(transaction, participant)| Receipt::Transaction {
                    transaction,
                    participant,
                }),
            Operation::RecordWithdrawal {
                session_id,
                participant_id,
                amount,
            } => self
                .record_withdrawal(caller, session_id, participant_id, amount)
                .await
                .map(|(transaction, participant)| Receipt::Transaction {
                    transaction,
                    participant,
                }),
            Operation::RecordCorrection {
                session_id,
                participant_id,
                amount,
                reason,
            } => self
                .record_correction(caller, session_id, participant_id, amount, &reason)
                .await
                .map(|(transaction, participant)| Receipt::Transaction {
                    transaction,
                    participant,
                }),
            Operation::SetParticipantStatus {
                session_id,
                participant_id,
                status,
            } => self
                .set_participant_status(caller, session_id, participant_id, status)
                .await
                .map(|participant| Receipt::Participant { participant }),
            Operation::RequestTopUp { session_id, amount } => self
                .request_top_up(caller, session_id, amount)
                .await
                .map(|request| Receipt::TopUp {
                    request,
                    transaction: None,
                }),
            Operation::ResolveTopUp {
                session_id,
                request_id,
                approve,
            } => self
                .resolve_top_up(caller, session_id, request_id, approve)
                .await
                .map(|(request, transaction)| Receipt::TopUp {
                    request,
                    transaction,
                }),
        };

        match &result {
            Ok(_) => crate::metrics::record_ledger_op(name, "ok"),
            Err(e) => {
                crate::metrics::record_ledger_op(name, e.error_code());
                debug!(session = ?session_id, error = %e, "ledger operation rejected");
            }
        }
        result
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a `SCHEDULED` session owned by `operator`.
    pub async fn create_session(
        &self,
        operator: ParticipantId,
        buy_in: Decimal,
        precision: u32,
        currency: &str,
        scheduled_start: Option<DateTime<Utc>>,
    ) -> Result<SessionRecord, LedgerError> {
        if precision > ops::MAX_PRECISION {
            return Err(LedgerError::InvalidAmount(format!(
                "precision must be between 0 and {}",
                ops::MAX_PRECISION
            )));
        }
        let buy_in = ops::positive(buy_in, precision)?;
        let now = now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            operator_id: operator,
            status: SessionStatus::Scheduled,
            buy_in,
            precision,
            currency: currency.trim().to_ascii_uppercase(),
            scheduled_start,
            created_at: now,
            started_at: None,
            ended_at: None,
        };

        let mut tx = self.db.begin().await?;
        SessionRepository::new(&mut tx).insert(&session).await?;
        tx.commit().await?;

        info!(session = %session.id, operator = %operator, "session created");
        self.sink.publish(LedgerEvent::SessionCreated {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Apply a lifecycle action. Completion settles every open participant
    /// in the same store transaction.
    pub async fn transition(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        action: SessionAction,
    ) -> Result<(SessionRecord, Vec<SettlementLine>), LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;
        let next = machine::next_status(m.session.status, action)?;

        let mut session = m.session.clone();
        session.status = next;
        if next == SessionStatus::Active && session.started_at.is_none() {
            session.started_at = Some(now);
        }
        if next == SessionStatus::Completed {
            session.ended_at = Some(now);
        }

        let settlement = if next == SessionStatus::Completed {
            settle_all(&mut m.tx, &session, now).await?
        } else {
            Vec::new()
        };

        SessionRepository::new(&mut m.tx)
            .update_status(session_id, next, session.started_at, session.ended_at)
            .await?;

        let event = LedgerEvent::SessionStatusChanged {
            session: session.clone(),
            settlement: settlement.clone(),
        };
        self.finish(m, event).await?;
        info!(session = %session_id, status = %next, "session status changed");
        Ok((session, settlement))
    }

    // ========================================================================
    // Roster
    // ========================================================================

    /// Create `INVITED` records for ids not yet in the session. Returns the
    /// new records and the ids that were skipped.
    pub async fn invite_participants(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        participant_ids: &[ParticipantId],
    ) -> Result<(Vec<ParticipantRecord>, Vec<ParticipantId>), LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;
        machine::ensure_mutable(m.session.status, Mutation::Roster)?;

        let mut seen = HashSet::new();
        let mut invited = Vec::new();
        let mut skipped = Vec::new();
        for &participant_id in participant_ids {
            if !seen.insert(participant_id) {
                continue;
            }
            let mut participants = ParticipantRepository::new(&mut m.tx);
            if participants.find(session_id, participant_id).await?.is_some() {
                skipped.push(participant_id);
                continue;
            }
            let record = ops::blank(
                session_id,
                participant_id,
                ParticipantStatus::Invited,
                m.session.precision,
                now,
            );
            participants.save(&record).await?;
            OutboxRepository::new(&mut m.tx)
                .enqueue(
                    session_id,
                    participant_id,
                    NotificationKind::Invitation,
                    &json!({
                        "session_id": session_id,
                        "buy_in": m.session.buy_in,
                        "currency": m.session.currency,
                        "scheduled_start": m.session.scheduled_start,
                    }),
                    now,
                )
                .await?;
            invited.push(record);
        }

        let event = LedgerEvent::ParticipantsInvited {
            session_id,
            participants: invited.clone(),
        };
        self.finish(m, event).await?;
        info!(session = %session_id, invited = invited.len(), skipped = skipped.len(), "participants invited");
        Ok((invited, skipped))
    }

    /// Add a participant mid-session with an implicit buy-in recorded as a
    /// `SEED` transaction.
    pub async fn add_participant(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<(Transaction, ParticipantRecord), LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;
        machine::ensure_mutable(m.session.status, Mutation::Contribution)?;

        let existing = ParticipantRepository::new(&mut m.tx)
            .find(session_id, participant_id)
            .await?;
        let record = match existing {
            None => ops::blank(
                session_id,
                participant_id,
                ParticipantStatus::Active,
                m.session.precision,
                now,
            ),
            Some(r) if r.status == ParticipantStatus::Invited => r,
            Some(_) => return Err(LedgerError::ParticipantExists(participant_id)),
        };

        let buy_in = m.session.buy_in;
        let record = ops::contribute(record, buy_in)?;
        let (transaction, participant) = append(
            &mut m.tx,
            record,
            TransactionKind::Seed,
            buy_in,
            Some("buy-in".to_string()),
            NotificationKind::Contribution,
            now,
        )
        .await?;

        let event = LedgerEvent::TransactionRecorded {
            transaction: transaction.clone(),
            participant: participant.clone(),
        };
        self.finish(m, event).await?;
        info!(session = %session_id, participant = %participant_id, amount = %buy_in, "participant added");
        Ok((transaction, participant))
    }

    /// Explicitly set `ACTIVE`, `SITTING_OUT` or `ELIMINATED`.
    pub async fn set_participant_status(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        participant_id: ParticipantId,
        status: ParticipantStatus,
    ) -> Result<ParticipantRecord, LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;
        machine::ensure_mutable(m.session.status, Mutation::Roster)?;

        let mut participants = ParticipantRepository::new(&mut m.tx);
        let mut record = participants
            .find(session_id, participant_id)
            .await?
            .ok_or(LedgerError::ParticipantNotFound(participant_id))?;
        if record.status == ParticipantStatus::CashedOut {
            return Err(LedgerError::AlreadySettled(participant_id));
        }
        record.status = machine::participant_change(record.status, status)?;
        participants.save(&record).await?;

        let event = LedgerEvent::ParticipantUpdated {
            participant: record.clone(),
        };
        self.finish(m, event).await?;
        Ok(record)
    }

    // ========================================================================
    // Money
    // ========================================================================

    /// Record money put in by a participant, creating an `ACTIVE` record
    /// when none exists.
    pub async fn record_contribution(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        participant_id: ParticipantId,
        amount: Decimal,
        note: Option<String>,
    ) -> Result<(Transaction, ParticipantRecord), LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;
        let amount = ops::positive(amount, m.session.precision)?;
        machine::ensure_mutable(m.session.status, Mutation::Contribution)?;

        let (transaction, participant) =
            contribute_in(&mut m.tx, &m.session, participant_id, amount, note, now).await?;

        let event = LedgerEvent::TransactionRecorded {
            transaction: transaction.clone(),
            participant: participant.clone(),
        };
        self.finish(m, event).await?;
        info!(session = %session_id, participant = %participant_id, amount = %amount, "contribution recorded");
        Ok((transaction, participant))
    }

    /// Cash a participant out; fixes their final balance.
    pub async fn record_withdrawal(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        participant_id: ParticipantId,
        amount: Decimal,
    ) -> Result<(Transaction, ParticipantRecord), LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;
        let amount = ops::non_negative(amount, m.session.precision)?;
        machine::ensure_mutable(m.session.status, Mutation::Withdrawal)?;

        let record = ParticipantRepository::new(&mut m.tx)
            .find(session_id, participant_id)
            .await?
            .ok_or(LedgerError::ParticipantNotFound(participant_id))?;
        let record = ops::withdraw(record, amount, now)?;
        let (transaction, participant) = append(
            &mut m.tx,
            record,
            TransactionKind::Withdrawal,
            amount,
            None,
            NotificationKind::Withdrawal,
            now,
        )
        .await?;

        let event = LedgerEvent::TransactionRecorded {
            transaction: transaction.clone(),
            participant: participant.clone(),
        };
        self.finish(m, event).await?;
        info!(
            session = %session_id,
            participant = %participant_id,
            amount = %amount,
            final_balance = ?participant.final_balance,
            "withdrawal recorded"
        );
        Ok((transaction, participant))
    }

    /// Apply a signed correction with a mandatory reason.
    pub async fn record_correction(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        participant_id: ParticipantId,
        amount: Decimal,
        reason: &str,
    ) -> Result<(Transaction, ParticipantRecord), LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::InvalidReason);
        }
        let amount = ops::non_zero(amount, m.session.precision)?;
        machine::ensure_mutable(m.session.status, Mutation::Correction)?;

        let record = ParticipantRepository::new(&mut m.tx)
            .find(session_id, participant_id)
            .await?
            .ok_or(LedgerError::ParticipantNotFound(participant_id))?;
        let record = ops::correct(record, amount)?;
        let (transaction, participant) = append(
            &mut m.tx,
            record,
            TransactionKind::Correction,
            amount,
            Some(reason.to_string()),
            NotificationKind::Correction,
            now,
        )
        .await?;

        let event = LedgerEvent::TransactionRecorded {
            transaction: transaction.clone(),
            participant: participant.clone(),
        };
        self.finish(m, event).await?;
        info!(session = %session_id, participant = %participant_id, amount = %amount, reason, "correction recorded");
        Ok((transaction, participant))
    }

    // ========================================================================
    // Top-ups
    // ========================================================================

    /// A participant asks the operator for a top-up.
    pub async fn request_top_up(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        amount: Decimal,
    ) -> Result<TopUpRequest, LedgerError> {
        let now = now();
        let lock = self.lock(session_id).await;
        let mut tx = self.db.begin().await?;
        let session = open_session(&mut tx, session_id, now).await?;

        let record = ParticipantRepository::new(&mut tx)
            .find(session_id, caller)
            .await?
            .ok_or(LedgerError::NotAuthorized)?;
        let amount = ops::positive(amount, session.precision)?;
        machine::ensure_mutable(session.status, Mutation::Roster)?;
        if record.status == ParticipantStatus::CashedOut {
            return Err(LedgerError::AlreadySettled(caller));
        }

        let request = TopUpRepository::new(&mut tx)
            .insert(session_id, caller, amount, now)
            .await?;

        let m = Mutating { tx, session, lock };
        let event = LedgerEvent::TopUpRequested {
            operator_id: m.session.operator_id,
            request: request.clone(),
        };
        self.finish(m, event).await?;
        info!(session = %session_id, participant = %caller, amount = %amount, "top-up requested");
        Ok(request)
    }

    /// Approve or decline a pending top-up. Approval records a contribution
    /// in the same transaction.
    pub async fn resolve_top_up(
        &self,
        caller: ParticipantId,
        session_id: SessionId,
        request_id: i64,
        approve: bool,
    ) -> Result<(TopUpRequest, Option<Transaction>), LedgerError> {
        let now = now();
        let mut m = self.begin_mutation(session_id, caller, now).await?;

        let mut request = TopUpRepository::new(&mut m.tx)
            .find(session_id, request_id)
            .await?
            .ok_or(LedgerError::TopUpNotFound(request_id))?;
        if request.status != TopUpStatus::Pending {
            return Err(LedgerError::TopUpNotPending(request_id));
        }

        let contribution = if approve {
            machine::ensure_mutable(m.session.status, Mutation::Contribution)?;
            let note = Some(format!("top-up #{request_id}"));
            Some(
                contribute_in(
                    &mut m.tx,
                    &m.session,
                    request.participant_id,
                    request.amount,
                    note,
                    now,
                )
                .await?,
            )
        } else {
            None
        };

        request.status = if approve {
            TopUpStatus::Approved
        } else {
            TopUpStatus::Declined
        };
        request.resolved_at = Some(now);
        TopUpRepository::new(&mut m.tx)
            .resolve(request_id, request.status, now)
            .await?;
        OutboxRepository::new(&mut m.tx)
            .enqueue(
                session_id,
                request.participant_id,
                NotificationKind::TopUpResolved,
                &json!({
                    "session_id": session_id,
                    "request_id": request_id,
                    "approved": approve,
                    "amount": request.amount,
                }),
                now,
            )
            .await?;

        let transaction = contribution.as_ref().map(|(t, _)| t.clone());
        let event = LedgerEvent::TopUpResolved {
            request: request.clone(),
            contribution,
        };
        self.finish(m, event).await?;
        info!(session = %session_id, request = request_id, approve, "top-up resolved");
        Ok((request, transaction))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub async fn session(&self, session_id: SessionId) -> Result<SessionRecord, LedgerError> {
        let mut conn = self.db.acquire().await?;
        SessionRepository::new(&mut conn)
            .find(session_id)
            .await?
            .ok_or(LedgerError::SessionNotFound(session_id))
    }

    /// Session, participants, recent transactions, pending top-ups and stats.
    pub async fn snapshot(&self, session_id: SessionId) -> Result<SessionSnapshot, LedgerError> {
        let mut conn = self.db.acquire().await?;
        let session = SessionRepository::new(&mut conn)
            .find(session_id)
            .await?
            .ok_or(LedgerError::SessionNotFound(session_id))?;
        let participants = ParticipantRepository::new(&mut conn).list(session_id).await?;
        let recent_transactions = TransactionRepository::new(&mut conn)
            .recent(session_id, self.snapshot_transactions)
            .await?;
        let pending_top_ups = TopUpRepository::new(&mut conn).pending(session_id).await?;
        let stats = ops::stats(&participants)?;

        Ok(SessionSnapshot {
            session,
            participants,
            recent_transactions,
            pending_top_ups,
            stats,
        })
    }

    /// Most recent transactions, newest first.
    pub async fn transactions(
        &self,
        session_id: SessionId,
        limit: u32,
    ) -> Result<Vec<Transaction>, LedgerError> {
        let mut conn = self.db.acquire().await?;
        if SessionRepository::new(&mut conn).find(session_id).await?.is_none() {
            return Err(LedgerError::SessionNotFound(session_id));
        }
        Ok(TransactionRepository::new(&mut conn)
            .recent(session_id, limit)
            .await?)
    }

    /// Whether a participant's cached aggregate matches its transaction log.
    ///
    /// The log is replayed in order: contributed must equal the sum of
    /// contributions, seeds and corrections, and a cashed-out participant's
    /// withdrawn amount and final balance must match what the withdrawal
    /// entry fixed at the time it was written.
    pub async fn audit_participant(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<bool, LedgerError> {
        let mut conn = self.db.acquire().await?;
        let record = ParticipantRepository::new(&mut conn)
            .find(session_id, participant_id)
            .await?
            .ok_or(LedgerError::ParticipantNotFound(participant_id))?;
        let entries = TransactionRepository::new(&mut conn)
            .for_participant(session_id, participant_id)
            .await?;

        let mut contributed = Decimal::ZERO;
        let mut settled = None;
        for entry in &entries {
            if entry.kind.counts_toward_contributed() {
                contributed =
                    ops::checked_total([contributed, entry.amount], "logged contributions")?;
            } else if entry.kind == TransactionKind::Withdrawal {
                let final_balance =
                    ops::checked_total([entry.amount, -contributed], "logged balance")?;
                settled = Some((entry.amount, final_balance));
            }
        }

        let balance_ok = match (record.status, settled) {
            (ParticipantStatus::CashedOut, Some((withdrawn, final_balance))) => {
                record.withdrawn == Some(withdrawn) && record.final_balance == Some(final_balance)
            }
            (ParticipantStatus::CashedOut, None) | (_, Some(_)) => false,
            (_, None) => record.withdrawn.is_none() && record.final_balance.is_none(),
        };
        Ok(contributed == record.contributed && balance_ok)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn lock(&self, session_id: SessionId) -> SessionLock {
        let mutex = self
            .locks
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        SessionLock {
            session_id,
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Number of sessions with a live critical section.
    pub fn locked_sessions(&self) -> usize {
        self.locks.len()
    }

    /// Take the session lock, open a transaction that holds the write lock,
    /// load the session and check the caller is its operator.
    async fn begin_mutation(
        &self,
        session_id: SessionId,
        caller: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<Mutating, LedgerError> {
        let lock = self.lock(session_id).await;
        let mut tx = self.db.begin().await?;
        let session = open_session(&mut tx, session_id, now).await?;
        if session.operator_id != caller {
            return Err(LedgerError::NotAuthorized);
        }
        Ok(Mutating { tx, session, lock })
    }

    /// Commit, publish while still holding the session lock, then release.
    async fn finish(&self, m: Mutating, event: LedgerEvent) -> Result<(), LedgerError> {
        let Mutating { tx, lock, .. } = m;
        tx.commit().await?;
        self.sink.publish(event);
        drop(lock);
        Ok(())
    }
}

/// Touch the session row (taking SQLite's write lock) and load it.
async fn open_session(
    conn: &mut SqliteConnection,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> Result<SessionRecord, LedgerError> {
    let mut sessions = SessionRepository::new(conn);
    if !sessions.touch(session_id, now).await? {
        return Err(LedgerError::SessionNotFound(session_id));
    }
    sessions
        .find(session_id)
        .await?
        .ok_or(LedgerError::SessionNotFound(session_id))
}

/// Persist an updated record, append its transaction and queue the
/// matching notification.
async fn append(
    conn: &mut SqliteConnection,
    record: ParticipantRecord,
    kind: TransactionKind,
    amount: Decimal,
    note: Option<String>,
    notification: NotificationKind,
    now: DateTime<Utc>,
) -> Result<(Transaction, ParticipantRecord), LedgerError> {
    ParticipantRepository::new(&mut *conn).save(&record).await?;
    let transaction = TransactionRepository::new(&mut *conn)
        .append(
            record.session_id,
            record.participant_id,
            kind,
            amount,
            note,
            now,
        )
        .await?;
    OutboxRepository::new(&mut *conn)
        .enqueue(
            record.session_id,
            record.participant_id,
            notification,
            &json!({
                "session_id": record.session_id,
                "transaction_id": transaction.id,
                "kind": kind,
                "amount": amount,
                "contributed": record.contributed,
                "final_balance": record.final_balance,
            }),
            now,
        )
        .await?;
    Ok((transaction, record))
}

/// Contribution path shared by `record_contribution` and top-up approval.
async fn contribute_in(
    conn: &mut SqliteConnection,
    session: &SessionRecord,
    participant_id: ParticipantId,
    amount: Decimal,
    note: Option<String>,
    now: DateTime<Utc>,
) -> Result<(Transaction, ParticipantRecord), LedgerError> {
    let record = ParticipantRepository::new(&mut *conn)
        .find(session.id, participant_id)
        .await?
        .unwrap_or_else(|| {
            ops::blank(
                session.id,
                participant_id,
                ParticipantStatus::Active,
                session.precision,
                now,
            )
        });
    let record = ops::contribute(record, amount)?;
    append(
        conn,
        record,
        TransactionKind::Contribution,
        amount,
        note,
        NotificationKind::Contribution,
        now,
    )
    .await
}

/// Settle every participant that has not cashed out and return one line per
/// participant.
async fn settle_all(
    conn: &mut SqliteConnection,
    session: &SessionRecord,
    now: DateTime<Utc>,
) -> Result<Vec<SettlementLine>, LedgerError> {
    let participants = ParticipantRepository::new(&mut *conn)
        .list(session.id)
        .await?;
    let mut lines = Vec::with_capacity(participants.len());

    for record in participants {
        let record = if record.status == ParticipantStatus::CashedOut {
            record
        } else {
            let settled = ops::settle(record, now);
            ParticipantRepository::new(&mut *conn).save(&settled).await?;
            TransactionRepository::new(&mut *conn)
                .append(
                    session.id,
                    settled.participant_id,
                    TransactionKind::Withdrawal,
                    settled.contributed,
                    Some("settlement".to_string()),
                    now,
                )
                .await?;
            settled
        };
        let line = ops::settlement_line(&record);
        OutboxRepository::new(&mut *conn)
            .enqueue(
                session.id,
                record.participant_id,
                NotificationKind::Settlement,
                &json!({
                    "session_id": session.id,
                    "contributed": line.contributed,
                    "withdrawn": line.withdrawn,
                    "final_balance": line.final_balance,
                    "currency": session.currency,
                }),
                now,
            )
            .await?;
        lines.push(line);
    }
    Ok(lines)
}
