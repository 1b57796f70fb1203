//! Property-based tests for participant aggregates.
//!
//! Random sequences of contributions and signed corrections are replayed
//! against a fresh engine. After every step the cached aggregate must match
//! the transaction log, and a rejected step must leave both untouched.

use parking_lot::Mutex;
use pitboss::db::Database;
use pitboss::error::LedgerError;
use pitboss::ledger::{EventSink, LedgerEngine, LedgerEvent};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Default)]
struct Counter {
    events: Mutex<usize>,
}

impl EventSink for Counter {
    fn publish(&self, _event: LedgerEvent) {
        *self.events.lock() += 1;
    }
}

#[derive(Debug, Clone)]
enum Step {
    Contribute(Decimal),
    Correct(Decimal),
}

fn half_of_decimal_range() -> Decimal {
    Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0)
}

// =============================================================================
// STRATEGIES
// =============================================================================

fn contribution_strategy() -> impl Strategy<Value = Decimal> {
    (1i64..=1_000).prop_map(Decimal::from)
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => contribution_strategy().prop_map(Step::Contribute),
        4 => (-2_000i64..=2_000)
            .prop_filter("corrections are non-zero", |c| *c != 0)
            .prop_map(|c| Step::Correct(Decimal::from(c))),
        1 => Just(Step::Contribute(half_of_decimal_range())),
        1 => Just(Step::Correct(half_of_decimal_range())),
    ]
}

/// What the engine should do with `step` given the current total.
fn expected(contributed: Decimal, step: &Step) -> Option<Decimal> {
    let amount = match step {
        Step::Contribute(a) | Step::Correct(a) => *a,
    };
    contributed
        .checked_add(amount)
        .filter(|total| !total.is_sign_negative() || total.is_zero())
}

async fn replay(first: Decimal, steps: Vec<Step>) -> Result<(), TestCaseError> {
    let db = Database::new(":memory:").await.unwrap();
    let counter = Arc::new(Counter::default());
    let engine = LedgerEngine::new(db, counter.clone(), 50);
    let operator = Uuid::new_v4();
    let session = engine
        .create_session(operator, dec!(10), 0, "usd", None)
        .await
        .unwrap()
        .id;
    let player = Uuid::new_v4();

    engine
        .record_contribution(operator, session, player, first, None)
        .await
        .unwrap();
    let mut contributed = first;

    for step in steps {
        let events_before = *counter.events.lock();
        let log_before = engine.transactions(session, 1_000).await.unwrap().len();

        let outcome = match &step {
            Step::Contribute(amount) => engine
                .record_contribution(operator, session, player, *amount, None)
                .await
                .map(|(_, record)| record),
            Step::Correct(amount) => engine
                .record_correction(operator, session, player, *amount, "recount")
                .await
                .map(|(_, record)| record),
        };

        match (expected(contributed, &step), outcome) {
            (Some(total), Ok(record)) => {
                prop_assert_eq!(record.contributed, total);
                contributed = total;
            }
            (None, Err(LedgerError::InvalidAmount(_))) => {
                prop_assert_eq!(*counter.events.lock(), events_before);
                prop_assert_eq!(
                    engine.transactions(session, 1_000).await.unwrap().len(),
                    log_before
                );
            }
            (want, got) => {
                return Err(TestCaseError::fail(format!(
                    "{step:?} on {contributed}: expected {want:?}, got {got:?}"
                )));
            }
        }

        prop_assert!(engine.audit_participant(session, player).await.unwrap());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn aggregate_always_matches_the_log(
        first in contribution_strategy(),
        steps in prop::collection::vec(step_strategy(), 0..16),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(replay(first, steps))?;
    }
}
