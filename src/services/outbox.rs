//! Notification outbox worker.
//!
//! The ledger engine writes notification intents into the `outbox` table in
//! the same transaction as the change they describe. This worker polls for
//! due entries and hands them to a [`NotificationSink`]. A failed delivery
//! is retried with exponential backoff; after `max_attempts` the entry is
//! marked failed and left for inspection.

use crate::config::OutboxConfig;
use crate::db::{Database, DbError, OutboxEntry, OutboxRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest delay between two attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// A delivery attempt failed; the entry will be retried.
#[derive(Debug, Clone, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Delivers notification intents to the outside world.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DeliveryError>;
}

/// Sink that logs each intent. Stands in for a messaging channel.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DeliveryError> {
        info!(
            id = entry.id,
            session = %entry.session_id,
            participant = %entry.participant_id,
            kind = entry.kind.as_str(),
            payload = %entry.payload,
            "notification"
        );
        Ok(())
    }
}

/// Outcome of one polling pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

/// Delay before retry number `attempts` (1-based): `base * 2^(attempts - 1)`.
pub fn backoff(base_secs: u64, attempts: u32) -> Duration {
    let base = Duration::from_secs(base_secs);
    let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
    base.checked_mul(factor).unwrap_or(MAX_BACKOFF).min(MAX_BACKOFF)
}

pub struct OutboxWorker {
    db: Database,
    sink: Arc<dyn NotificationSink>,
    config: OutboxConfig,
}

impl OutboxWorker {
    pub fn new(db: Database, sink: Arc<dyn NotificationSink>, config: OutboxConfig) -> Self {
        Self { db, sink, config }
    }

    /// Deliver every entry due at `now`.
    ///
    /// The connection is released while the sink runs so ledger writes are
    /// never blocked behind a slow delivery.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<PassStats, DbError> {
        let due = {
            let mut conn = self.db.acquire().await?;
            OutboxRepository::new(&mut conn)
                .due(now, self.config.batch_size)
                .await?
        };

        let mut stats = PassStats::default();
        for entry in due {
            let attempts = entry.attempts + 1;
            let outcome = self.sink.deliver(&entry).await;

            let mut conn = self.db.acquire().await?;
            let mut outbox = OutboxRepository::new(&mut conn);
            match outcome {
                Ok(()) => {
                    outbox.mark_delivered(entry.id, attempts, now).await?;
                    crate::metrics::record_outbox(entry.kind.as_str(), "delivered");
                    stats.delivered += 1;
                }
                Err(e) if attempts >= self.config.max_attempts => {
                    warn!(id = entry.id, attempts, error = %e, "notification failed permanently");
                    outbox.mark_failed(entry.id, attempts, now, &e.to_string()).await?;
                    crate::metrics::record_outbox(entry.kind.as_str(), "failed");
                    stats.failed += 1;
                }
                Err(e) => {
                    let delay = backoff(self.config.base_backoff_secs, attempts);
                    let next = now
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::hours(1));
                    debug!(id = entry.id, attempts, retry_in = ?delay, error = %e, "notification will be retried");
                    outbox.reschedule(entry.id, attempts, next, &e.to_string()).await?;
                    crate::metrics::record_outbox(entry.kind.as_str(), "retried");
                    stats.retried += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Poll until `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once(Utc::now()).await {
                            warn!(error = %e, "outbox pass failed");
                        }
                    }
                }
            }
            debug!("outbox worker stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NotificationKind, SessionRepository};
    use parking_lot::Mutex;
    use pitboss_proto::{SessionRecord, SessionStatus};
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    /// Fails the first `failures` deliveries, then succeeds.
    struct Flaky {
        failures: Mutex<u32>,
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl NotificationSink for Flaky {
        async fn deliver(&self, entry: &OutboxEntry) -> Result<(), DeliveryError> {
            self.seen.lock().push(entry.id);
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(DeliveryError("channel down".into()));
            }
            Ok(())
        }
    }

    async fn seeded() -> (Database, i64) {
        let db = Database::new(":memory:").await.unwrap();
        let now = Utc::now();
        let session = SessionRecord {
            id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            status: SessionStatus::Scheduled,
            buy_in: dec!(10.00),
            precision: 2,
            currency: "USD".into(),
            scheduled_start: None,
            created_at: now,
            started_at: None,
            ended_at: None,
        };
        let mut conn = db.acquire().await.unwrap();
        SessionRepository::new(&mut conn).insert(&session).await.unwrap();
        let id = OutboxRepository::new(&mut conn)
            .enqueue(
                session.id,
                Uuid::new_v4(),
                NotificationKind::Invitation,
                &json!({"session_id": session.id}),
                now,
            )
            .await
            .unwrap();
        drop(conn);
        (db, id)
    }

    fn config(max_attempts: u32) -> OutboxConfig {
        OutboxConfig {
            poll_interval_ms: 10,
            batch_size: 10,
            max_attempts,
            base_backoff_secs: 2,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(2, 1), Duration::from_secs(2));
        assert_eq!(backoff(2, 2), Duration::from_secs(4));
        assert_eq!(backoff(2, 4), Duration::from_secs(16));
        assert_eq!(backoff(2, 40), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn failed_delivery_is_rescheduled_then_delivered() {
        let (db, id) = seeded().await;
        let sink = Arc::new(Flaky {
            failures: Mutex::new(1),
            seen: Mutex::new(Vec::new()),
        });
        let worker = OutboxWorker::new(db.clone(), sink.clone(), config(5));

        let now = Utc::now();
        let first = worker.run_once(now).await.unwrap();
        assert_eq!(first, PassStats { delivered: 0, retried: 1, failed: 0 });

        // Not due yet.
        assert_eq!(worker.run_once(now).await.unwrap(), PassStats::default());

        let later = now + chrono::Duration::seconds(3);
        let second = worker.run_once(later).await.unwrap();
        assert_eq!(second.delivered, 1);

        let mut conn = db.acquire().await.unwrap();
        let entry = OutboxRepository::new(&mut conn).find(id).await.unwrap().unwrap();
        assert_eq!(entry.attempts, 2);
        assert!(entry.delivered_at.is_some());
        assert_eq!(sink.seen.lock().len(), 2);
    }

    #[tokio::test]
    async fn exhausted_entry_is_marked_failed() {
        let (db, id) = seeded().await;
        let sink = Arc::new(Flaky {
            failures: Mutex::new(u32::MAX),
            seen: Mutex::new(Vec::new()),
        });
        let worker = OutboxWorker::new(db.clone(), sink, config(2));

        let now = Utc::now();
        worker.run_once(now).await.unwrap();
        let stats = worker.run_once(now + chrono::Duration::hours(2)).await.unwrap();
        assert_eq!(stats.failed, 1);

        let mut conn = db.acquire().await.unwrap();
        let entry = OutboxRepository::new(&mut conn).find(id).await.unwrap().unwrap();
        assert!(entry.failed_at.is_some());
        assert_eq!(entry.last_error.as_deref(), Some("delivery failed: channel down"));
        assert!(OutboxRepository::new(&mut conn).due(now + chrono::Duration::days(1), 10).await.unwrap().is_empty());
    }
}
