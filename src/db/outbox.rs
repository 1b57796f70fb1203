//! Notification outbox.
//!
//! Intents are written by the ledger engine inside its transaction and drained
//! by the outbox worker. An entry is pending until it is either delivered or
//! marked failed.

use super::DbError;
use super::convert::{millis, opt_timestamp, timestamp, uuid};
use chrono::{DateTime, Utc};
use pitboss_proto::{ParticipantId, SessionId};
use sqlx::SqliteConnection;
use std::fmt;
use std::str::FromStr;

/// What a queued notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Invitation,
    Contribution,
    Withdrawal,
    Correction,
    Settlement,
    TopUpResolved,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invitation => "invitation",
            Self::Contribution => "contribution",
            Self::Withdrawal => "withdrawal",
            Self::Correction => "correction",
            Self::Settlement => "settlement",
            Self::TopUpResolved => "top_up_resolved",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invitation" => Ok(Self::Invitation),
            "contribution" => Ok(Self::Contribution),
            "withdrawal" => Ok(Self::Withdrawal),
            "correction" => Ok(Self::Correction),
            "settlement" => Ok(Self::Settlement),
            "top_up_resolved" => Ok(Self::TopUpResolved),
            other => Err(format!("unknown notification kind: {other}")),
        }
    }
}

/// A queued notification intent.
#[derive(Debug, Clone)]
pub struct OutboxEntry {
    pub id: i64,
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

type OutboxRow = (
    i64,
    String,
    String,
    String,
    String,
    i64,
    i64,
    Option<i64>,
    Option<i64>,
    Option<String>,
);

fn from_row(row: OutboxRow) -> Result<OutboxEntry, DbError> {
    let (
        id,
        session_id,
        participant_id,
        kind,
        payload,
        attempts,
        next_attempt_at,
        delivered_at,
        failed_at,
        last_error,
    ) = row;
    Ok(OutboxEntry {
        id,
        session_id: uuid(&session_id)?,
        participant_id: uuid(&participant_id)?,
        kind: kind.parse().map_err(DbError::Corrupt)?,
        payload: serde_json::from_str(&payload)
            .map_err(|e| DbError::Corrupt(format!("bad outbox payload: {e}")))?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        next_attempt_at: timestamp(next_attempt_at)?,
        delivered_at: opt_timestamp(delivered_at)?,
        failed_at: opt_timestamp(failed_at)?,
        last_error,
    })
}

/// Repository for the `outbox` table.
pub struct OutboxRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OutboxRepository<'c> {
    /// Create a repository over a borrowed connection.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Queue an intent, due immediately.
    pub async fn enqueue(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
        kind: NotificationKind,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO outbox (session_id, participant_id, kind, payload, attempts,
                                next_attempt_at, created_at)
            VALUES (?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(session_id.to_string())
        .bind(participant_id.to_string())
        .bind(kind.as_str())
        .bind(payload.to_string())
        .bind(millis(now))
        .bind(millis(now))
        .execute(&mut *self.conn)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Pending entries due at or before `now`, oldest first.
    pub async fn due(
        &mut self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OutboxEntry>, DbError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, session_id, participant_id, kind, payload, attempts,
                   next_attempt_at, delivered_at, failed_at, last_error
            FROM outbox
            WHERE delivered_at IS NULL AND failed_at IS NULL AND next_attempt_at <= ?
            ORDER BY next_attempt_at, id
            LIMIT ?
            "#,
        )
        .bind(millis(now))
        .bind(i64::from(limit))
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    /// Fetch one entry.
    pub async fn find(&mut self, id: i64) -> Result<Option<OutboxEntry>, DbError> {
        let row = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, session_id, participant_id, kind, payload, attempts,
                   next_attempt_at, delivered_at, failed_at, last_error
            FROM outbox
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(from_row).transpose()
    }

    /// Entries for a session, oldest first.
    pub async fn for_session(&mut self, session_id: SessionId) -> Result<Vec<OutboxEntry>, DbError> {
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            SELECT id, session_id, participant_id, kind, payload, attempts,
                   next_attempt_at, delivered_at, failed_at, last_error
            FROM outbox
            WHERE session_id = ?
            ORDER BY id
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    pub async fn mark_delivered(
        &mut self,
        id: i64,
        attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE outbox SET delivered_at = ?, attempts = ?, last_error = NULL WHERE id = ?")
            .bind(millis(now))
            .bind(i64::from(attempts))
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn reschedule(
        &mut self,
        id: i64,
        attempts: u32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE outbox SET attempts = ?, next_attempt_at = ?, last_error = ? WHERE id = ?")
            .bind(i64::from(attempts))
            .bind(millis(next_attempt_at))
            .bind(error)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(
        &mut self,
        id: i64,
        attempts: u32,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE outbox SET attempts = ?, failed_at = ?, last_error = ? WHERE id = ?")
            .bind(i64::from(attempts))
            .bind(millis(now))
            .bind(error)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn kind_round_trips() {
        for kind in [
            NotificationKind::Invitation,
            NotificationKind::Settlement,
            NotificationKind::TopUpResolved,
        ] {
            assert_eq!(kind.as_str().parse::<NotificationKind>().unwrap(), kind);
        }
        assert!("sms".parse::<NotificationKind>().is_err());
    }

    #[tokio::test]
    async fn due_respects_schedule_and_terminal_states() {
        let db = Database::new(":memory:").await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = OutboxRepository::new(&mut conn);
        let now = Utc::now();
        let payload = serde_json::json!({"amount": "10.00"});

        let a = repo
            .enqueue(Uuid::new_v4(), Uuid::new_v4(), NotificationKind::Contribution, &payload, now)
            .await
            .unwrap();
        let b = repo
            .enqueue(Uuid::new_v4(), Uuid::new_v4(), NotificationKind::Withdrawal, &payload, now)
            .await
            .unwrap();
        let c = repo
            .enqueue(Uuid::new_v4(), Uuid::new_v4(), NotificationKind::Invitation, &payload, now)
            .await
            .unwrap();

        repo.mark_delivered(a, 1, now).await.unwrap();
        repo.reschedule(b, 1, now + Duration::seconds(30), "timeout")
            .await
            .unwrap();

        let due = repo.due(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, c);
        assert_eq!(due[0].payload, payload);

        let later = repo.due(now + Duration::seconds(31), 10).await.unwrap();
        assert_eq!(later.len(), 2);

        let rescheduled = repo.find(b).await.unwrap().unwrap();
        assert_eq!(rescheduled.attempts, 1);
        assert_eq!(rescheduled.last_error.as_deref(), Some("timeout"));
    }
}
