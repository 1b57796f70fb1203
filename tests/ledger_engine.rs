//! Integration tests for the ledger engine: money flows, the session state
//! machine and the notification outbox.

use parking_lot::Mutex;
use pitboss::db::{Database, NotificationKind, OutboxRepository, TransactionRepository};
use pitboss::error::LedgerError;
use pitboss::ledger::{EventSink, LedgerEngine, LedgerEvent};
use pitboss_proto::{
    Operation, ParticipantId, ParticipantStatus, Receipt, SessionAction, SessionId,
    SessionStatus, TransactionKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<LedgerEvent>>,
}

impl EventSink for Recorder {
    fn publish(&self, event: LedgerEvent) {
        self.events.lock().push(event);
    }
}

impl Recorder {
    fn count(&self) -> usize {
        self.events.lock().len()
    }
}

struct Fixture {
    engine: LedgerEngine,
    events: Arc<Recorder>,
    operator: ParticipantId,
    session: SessionId,
}

async fn fixture() -> Fixture {
    fixture_with_precision(2).await
}

async fn fixture_with_precision(precision: u32) -> Fixture {
    let db = Database::new(":memory:").await.unwrap();
    let events = Arc::new(Recorder::default());
    let engine = LedgerEngine::new(db, events.clone(), 50);
    let operator = Uuid::new_v4();
    let session = engine
        .create_session(operator, dec!(50.00), precision, "usd", None)
        .await
        .unwrap();
    Fixture {
        engine,
        events,
        operator,
        session: session.id,
    }
}

impl Fixture {
    async fn contribute(&self, p: ParticipantId, amount: Decimal) -> Result<(), LedgerError> {
        self.engine
            .record_contribution(self.operator, self.session, p, amount, None)
            .await
            .map(|_| ())
    }

    async fn transition(&self, action: SessionAction) -> Result<SessionStatus, LedgerError> {
        self.engine
            .transition(self.operator, self.session, action)
            .await
            .map(|(s, _)| s.status)
    }
}

#[tokio::test]
async fn contribution_then_cash_out_scenario() {
    let f = fixture().await;
    let p1 = Uuid::new_v4();

    let (_, record) = f
        .engine
        .record_contribution(f.operator, f.session, p1, dec!(100.00), None)
        .await
        .unwrap();
    assert_eq!(record.status, ParticipantStatus::Active);
    assert_eq!(record.contributed, dec!(100.00));

    let (_, record) = f
        .engine
        .record_contribution(f.operator, f.session, p1, dec!(50.00), None)
        .await
        .unwrap();
    assert_eq!(record.contributed, dec!(150.00));

    let (tx, record) = f
        .engine
        .record_withdrawal(f.operator, f.session, p1, dec!(200.00))
        .await
        .unwrap();
    assert_eq!(tx.kind, TransactionKind::Withdrawal);
    assert_eq!(record.final_balance, Some(dec!(50.00)));
    assert_eq!(record.status, ParticipantStatus::CashedOut);

    let before = f.events.count();
    let again = f
        .engine
        .record_withdrawal(f.operator, f.session, p1, dec!(10.00))
        .await;
    assert_eq!(again, Err(LedgerError::AlreadySettled(p1)));
    assert_eq!(f.events.count(), before, "rejected withdrawal published an event");

    let snapshot = f.engine.snapshot(f.session).await.unwrap();
    let kept = &snapshot.participants[0];
    assert_eq!(kept.withdrawn, Some(dec!(200.00)));
    assert_eq!(kept.final_balance, Some(dec!(50.00)));
}

#[tokio::test]
async fn completion_settles_open_participants() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    f.contribute(p, dec!(75.00)).await.unwrap();
    f.transition(SessionAction::Start).await.unwrap();

    let (session, lines) = f
        .engine
        .transition(f.operator, f.session, SessionAction::Complete)
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.ended_at.is_some());
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].final_balance, dec!(0.00));
    assert_eq!(lines[0].final_balance.to_string(), "0.00");

    let snapshot = f.engine.snapshot(f.session).await.unwrap();
    let record = &snapshot.participants[0];
    assert_eq!(record.status, ParticipantStatus::CashedOut);
    assert_eq!(record.withdrawn, Some(dec!(75.00)));

    let history = f.engine.transactions(f.session, 10).await.unwrap();
    assert!(history.iter().any(|t| t.kind == TransactionKind::Withdrawal
        && t.note.as_deref() == Some("settlement")
        && t.amount == dec!(75.00)));
    assert!(f.engine.audit_participant(f.session, p).await.unwrap());
}

#[tokio::test]
async fn completion_leaves_cashed_out_participants_alone() {
    let f = fixture().await;
    let (early, late) = (Uuid::new_v4(), Uuid::new_v4());
    f.contribute(early, dec!(40.00)).await.unwrap();
    f.contribute(late, dec!(60.00)).await.unwrap();
    f.engine
        .record_withdrawal(f.operator, f.session, early, dec!(10.00))
        .await
        .unwrap();
    f.transition(SessionAction::Start).await.unwrap();

    let (_, lines) = f
        .engine
        .transition(f.operator, f.session, SessionAction::Complete)
        .await
        .unwrap();
    let early_line = lines.iter().find(|l| l.participant_id == early).unwrap();
    assert_eq!(early_line.final_balance, dec!(-30.00));
    let late_line = lines.iter().find(|l| l.participant_id == late).unwrap();
    assert_eq!(late_line.final_balance, dec!(0.00));
}

#[tokio::test]
async fn state_machine_rejects_invalid_transitions() {
    let f = fixture().await;
    assert_eq!(f.transition(SessionAction::Start).await, Ok(SessionStatus::Active));

    let before = f.events.count();
    assert!(matches!(
        f.transition(SessionAction::Start).await,
        Err(LedgerError::InvalidTransition {
            from: SessionStatus::Active,
            action: SessionAction::Start
        })
    ));
    assert!(matches!(
        f.transition(SessionAction::Cancel).await,
        Err(LedgerError::InvalidTransition { .. })
    ));

    assert_eq!(f.transition(SessionAction::Pause).await, Ok(SessionStatus::Paused));
    assert!(matches!(
        f.transition(SessionAction::Cancel).await,
        Err(LedgerError::InvalidTransition { .. })
    ));
    assert_eq!(f.events.count(), before + 1);

    assert_eq!(f.transition(SessionAction::Resume).await, Ok(SessionStatus::Active));
    assert_eq!(
        f.transition(SessionAction::Complete).await,
        Ok(SessionStatus::Completed)
    );
    assert!(matches!(
        f.transition(SessionAction::Resume).await,
        Err(LedgerError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn cancelled_session_accepts_nothing() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    f.contribute(p, dec!(10.00)).await.unwrap();
    assert_eq!(
        f.transition(SessionAction::Cancel).await,
        Ok(SessionStatus::Cancelled)
    );

    assert_eq!(
        f.contribute(p, dec!(10.00)).await,
        Err(LedgerError::SessionNotMutable(SessionStatus::Cancelled))
    );
    let correction = f
        .engine
        .record_correction(f.operator, f.session, p, dec!(-1.00), "typo")
        .await;
    assert_eq!(
        correction.map(|_| ()),
        Err(LedgerError::SessionNotMutable(SessionStatus::Cancelled))
    );
}

#[tokio::test]
async fn paused_session_refuses_contributions_but_allows_withdrawals() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    f.contribute(p, dec!(20.00)).await.unwrap();
    f.transition(SessionAction::Start).await.unwrap();
    f.transition(SessionAction::Pause).await.unwrap();

    assert_eq!(
        f.contribute(p, dec!(5.00)).await,
        Err(LedgerError::SessionNotMutable(SessionStatus::Paused))
    );
    let (_, record) = f
        .engine
        .record_withdrawal(f.operator, f.session, p, dec!(25.00))
        .await
        .unwrap();
    assert_eq!(record.final_balance, Some(dec!(5.00)));
}

#[tokio::test]
async fn aggregates_match_the_ledger_after_mixed_operations() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    let steps: [(bool, Decimal); 6] = [
        (true, dec!(10.00)),
        (true, dec!(2.50)),
        (false, dec!(-1.25)),
        (true, dec!(30.00)),
        (false, dec!(4.00)),
        (false, dec!(-0.25)),
    ];
    for (is_contribution, amount) in steps {
        if is_contribution {
            f.contribute(p, amount).await.unwrap();
        } else {
            f.engine
                .record_correction(f.operator, f.session, p, amount, "adjust")
                .await
                .unwrap();
        }
        assert!(f.engine.audit_participant(f.session, p).await.unwrap());
    }

    let mut conn = f.engine.database().acquire().await.unwrap();
    let derived = TransactionRepository::new(&mut conn)
        .contributed_total(f.session, p)
        .await
        .unwrap();
    assert_eq!(derived, dec!(45.00));

    drop(conn);
    f.engine
        .record_withdrawal(f.operator, f.session, p, dec!(50.00))
        .await
        .unwrap();
    let (_, record) = f
        .engine
        .record_correction(f.operator, f.session, p, dec!(-5.00), "miscounted chips")
        .await
        .unwrap();
    assert_eq!(record.contributed, dec!(40.00));
    assert_eq!(record.withdrawn, Some(dec!(50.00)));
    assert_eq!(record.final_balance, Some(dec!(5.00)), "final balance is fixed at cash-out");
    assert!(f.engine.audit_participant(f.session, p).await.unwrap());
}

fn half_of_decimal_range() -> Decimal {
    Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0)
}

#[tokio::test]
async fn totals_past_the_decimal_range_are_rejected() {
    let f = fixture_with_precision(0).await;
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let huge = half_of_decimal_range();

    f.contribute(a, huge).await.unwrap();
    let before = f.events.count();
    assert!(matches!(
        f.contribute(a, huge).await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert!(matches!(
        f.engine
            .record_correction(f.operator, f.session, a, huge, "recount")
            .await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert_eq!(f.events.count(), before, "rejected operations published an event");
    assert_eq!(f.engine.transactions(f.session, 10).await.unwrap().len(), 1);
    assert!(f.engine.audit_participant(f.session, a).await.unwrap());

    // each participant fits, their sum does not
    f.contribute(b, huge).await.unwrap();
    assert!(matches!(
        f.engine.snapshot(f.session).await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert_eq!(f.engine.locked_sessions(), 0);
}

#[tokio::test]
async fn amounts_are_validated() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    assert!(matches!(
        f.contribute(p, dec!(0)).await,
        Err(LedgerError::InvalidAmount(_))
    ));
    assert!(matches!(
        f.contribute(p, dec!(1.001)).await,
        Err(LedgerError::InvalidAmount(_))
    ));
    let reason = f
        .engine
        .record_correction(f.operator, f.session, p, dec!(1.00), "   ")
        .await;
    assert_eq!(reason.map(|_| ()), Err(LedgerError::InvalidReason));
    assert_eq!(f.events.count(), 1, "only SessionCreated was published");
}

#[tokio::test]
async fn only_the_operator_may_mutate() {
    let f = fixture().await;
    let stranger = Uuid::new_v4();
    let result = f
        .engine
        .record_contribution(stranger, f.session, stranger, dec!(10.00), None)
        .await;
    assert_eq!(result.map(|_| ()), Err(LedgerError::NotAuthorized));
    assert_eq!(
        f.engine
            .transition(stranger, f.session, SessionAction::Start)
            .await
            .map(|_| ()),
        Err(LedgerError::NotAuthorized)
    );
    assert_eq!(f.engine.locked_sessions(), 0);
}

#[tokio::test]
async fn add_participant_seeds_the_buy_in() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    f.engine
        .invite_participants(f.operator, f.session, &[p])
        .await
        .unwrap();

    let (tx, record) = f
        .engine
        .add_participant(f.operator, f.session, p)
        .await
        .unwrap();
    assert_eq!(tx.kind, TransactionKind::Seed);
    assert_eq!(tx.amount, dec!(50.00));
    assert_eq!(record.status, ParticipantStatus::Active);
    assert_eq!(record.contributed, dec!(50.00));

    assert_eq!(
        f.engine
            .add_participant(f.operator, f.session, p)
            .await
            .map(|_| ()),
        Err(LedgerError::ParticipantExists(p))
    );
    assert!(f.engine.audit_participant(f.session, p).await.unwrap());
}

#[tokio::test]
async fn invitations_queue_notifications_and_skip_known_participants() {
    let f = fixture().await;
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    f.contribute(a, dec!(10.00)).await.unwrap();

    let (invited, skipped) = f
        .engine
        .invite_participants(f.operator, f.session, &[a, b, b])
        .await
        .unwrap();
    assert_eq!(invited.len(), 1);
    assert_eq!(invited[0].participant_id, b);
    assert_eq!(invited[0].status, ParticipantStatus::Invited);
    assert_eq!(skipped, vec![a]);

    let mut conn = f.engine.database().acquire().await.unwrap();
    let outbox = OutboxRepository::new(&mut conn)
        .for_session(f.session)
        .await
        .unwrap();
    let invitations: Vec<_> = outbox
        .iter()
        .filter(|e| e.kind == NotificationKind::Invitation)
        .collect();
    assert_eq!(invitations.len(), 1);
    assert_eq!(invitations[0].participant_id, b);
    assert!(outbox.iter().any(|e| e.kind == NotificationKind::Contribution));
}

#[tokio::test]
async fn participant_status_changes_follow_the_participant_machine() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    f.contribute(p, dec!(10.00)).await.unwrap();

    let record = f
        .engine
        .set_participant_status(f.operator, f.session, p, ParticipantStatus::SittingOut)
        .await
        .unwrap();
    assert_eq!(record.status, ParticipantStatus::SittingOut);
    let record = f
        .engine
        .set_participant_status(f.operator, f.session, p, ParticipantStatus::Eliminated)
        .await
        .unwrap();
    assert_eq!(record.status, ParticipantStatus::Eliminated);

    f.contribute(p, dec!(10.00)).await.unwrap();
    let snapshot = f.engine.snapshot(f.session).await.unwrap();
    assert_eq!(snapshot.participants[0].status, ParticipantStatus::Active);
    assert_eq!(snapshot.stats.total_contributed, dec!(20.00));
    assert_eq!(snapshot.stats.active_participants, 1);

    let cash_out = f
        .engine
        .set_participant_status(f.operator, f.session, p, ParticipantStatus::CashedOut)
        .await;
    assert!(cash_out.is_err());
}

#[tokio::test]
async fn top_up_flow_through_submit() {
    let f = fixture().await;
    let p = Uuid::new_v4();
    f.contribute(p, dec!(50.00)).await.unwrap();
    f.transition(SessionAction::Start).await.unwrap();

    let receipt = f
        .engine
        .submit(
            Operation::RequestTopUp {
                session_id: f.session,
                amount: dec!(25.00),
            },
            p,
        )
        .await
        .unwrap();
    let request = match receipt {
        Receipt::TopUp { request, .. } => request,
        other => panic!("unexpected receipt {other:?}"),
    };
    match f.events.events.lock().last() {
        Some(LedgerEvent::TopUpRequested { operator_id, .. }) => {
            assert_eq!(*operator_id, f.operator)
        }
        other => panic!("unexpected event {other:?}"),
    }

    let stranger = Uuid::new_v4();
    let refused = f
        .engine
        .submit(
            Operation::ResolveTopUp {
                session_id: f.session,
                request_id: request.id,
                approve: true,
            },
            stranger,
        )
        .await;
    assert_eq!(refused, Err(LedgerError::NotAuthorized));

    let receipt = f
        .engine
        .submit(
            Operation::ResolveTopUp {
                session_id: f.session,
                request_id: request.id,
                approve: true,
            },
            f.operator,
        )
        .await
        .unwrap();
    match receipt {
        Receipt::TopUp {
            transaction: Some(tx),
            ..
        } => assert_eq!(tx.amount, dec!(25.00)),
        other => panic!("unexpected receipt {other:?}"),
    }

    let snapshot = f.engine.snapshot(f.session).await.unwrap();
    assert_eq!(snapshot.participants[0].contributed, dec!(75.00));
    assert!(snapshot.pending_top_ups.is_empty());

    let unknown = f
        .engine
        .submit(
            Operation::ResolveTopUp {
                session_id: f.session,
                request_id: request.id + 100,
                approve: false,
            },
            f.operator,
        )
        .await;
    assert_eq!(unknown, Err(LedgerError::TopUpNotFound(request.id + 100)));
}

#[tokio::test]
async fn unknown_session_is_reported() {
    let f = fixture().await;
    let missing = Uuid::new_v4();
    assert_eq!(
        f.engine.snapshot(missing).await.map(|_| ()),
        Err(LedgerError::SessionNotFound(missing))
    );
    assert_eq!(
        f.engine
            .record_contribution(f.operator, missing, Uuid::new_v4(), dec!(1.00), None)
            .await
            .map(|_| ()),
        Err(LedgerError::SessionNotFound(missing))
    );
}

#[tokio::test]
async fn sessions_run_in_parallel_without_leaking_locks() {
    let f = fixture().await;
    let other = f
        .engine
        .create_session(f.operator, dec!(10.00), 2, "EUR", None)
        .await
        .unwrap();
    assert_eq!(other.currency, "EUR");

    let engine = Arc::new(f.engine);
    let mut tasks = Vec::new();
    for i in 0..20 {
        let engine = Arc::clone(&engine);
        let session = if i % 2 == 0 { f.session } else { other.id };
        let operator = f.operator;
        tasks.push(tokio::spawn(async move {
            engine
                .record_contribution(operator, session, Uuid::new_v4(), dec!(1.00), None)
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(engine.locked_sessions(), 0);
    let a = engine.snapshot(f.session).await.unwrap();
    let b = engine.snapshot(other.id).await.unwrap();
    assert_eq!(a.stats.total_contributed, dec!(10.00));
    assert_eq!(b.stats.total_contributed, dec!(10.00));
}
