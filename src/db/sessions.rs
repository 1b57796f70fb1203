//! Session repository.

use super::DbError;
use super::convert::{decimal, millis, opt_timestamp, parse, timestamp, uuid};
use chrono::{DateTime, Utc};
use pitboss_proto::{SessionId, SessionRecord, SessionStatus};
use sqlx::SqliteConnection;

type SessionRow = (
    String,
    String,
    String,
    String,
    i64,
    String,
    Option<i64>,
    i64,
    Option<i64>,
    Option<i64>,
);

fn from_row(row: SessionRow) -> Result<SessionRecord, DbError> {
    let (
        id,
        operator_id,
        status,
        buy_in,
        precision,
        currency,
        scheduled_start,
        created_at,
        started_at,
        ended_at,
    ) = row;
    Ok(SessionRecord {
        id: uuid(&id)?,
        operator_id: uuid(&operator_id)?,
        status: parse(&status)?,
        buy_in: decimal(&buy_in)?,
        precision: u32::try_from(precision)
            .map_err(|_| DbError::Corrupt(format!("bad precision {precision}")))?,
        currency,
        scheduled_start: opt_timestamp(scheduled_start)?,
        created_at: timestamp(created_at)?,
        started_at: opt_timestamp(started_at)?,
        ended_at: opt_timestamp(ended_at)?,
    })
}

/// Repository for session rows.
pub struct SessionRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SessionRepository<'c> {
    /// Create a repository over a borrowed connection.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert a new session.
    pub async fn insert(&mut self, session: &SessionRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, operator_id, status, buy_in, precision, currency,
                                  scheduled_start, created_at, started_at, ended_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.operator_id.to_string())
        .bind(session.status.as_str())
        .bind(session.buy_in.to_string())
        .bind(i64::from(session.precision))
        .bind(&session.currency)
        .bind(session.scheduled_start.map(millis))
        .bind(millis(session.created_at))
        .bind(session.started_at.map(millis))
        .bind(session.ended_at.map(millis))
        .bind(millis(session.created_at))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    /// Find a session by id.
    pub async fn find(&mut self, id: SessionId) -> Result<Option<SessionRecord>, DbError> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, operator_id, status, buy_in, precision, currency,
                   scheduled_start, created_at, started_at, ended_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(from_row).transpose()
    }

    /// Bump `updated_at`; returns `false` when the session does not exist.
    ///
    /// Issued first in every ledger transaction so SQLite takes the write
    /// lock before anything is read.
    pub async fn touch(&mut self, id: SessionId, now: DateTime<Utc>) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(millis(now))
            .bind(id.to_string())
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Persist a status change and its lifecycle timestamps.
    pub async fn update_status(
        &mut self,
        id: SessionId,
        status: SessionStatus,
        started_at: Option<DateTime<Utc>>,
        ended_at: Option<DateTime<Utc>>,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = ?, started_at = ?, ended_at = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(started_at.map(millis))
        .bind(ended_at.map(millis))
        .bind(id.to_string())
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }
}
