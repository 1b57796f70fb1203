//! Top-up request repository.

use super::DbError;
use super::convert::{decimal, millis, opt_timestamp, parse, timestamp, uuid};
use chrono::{DateTime, Utc};
use pitboss_proto::{ParticipantId, SessionId, TopUpRequest, TopUpStatus};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

type TopUpRow = (i64, String, String, String, String, i64, Option<i64>);

fn from_row(row: TopUpRow) -> Result<TopUpRequest, DbError> {
    let (id, session_id, participant_id, amount, status, created_at, resolved_at) = row;
    Ok(TopUpRequest {
        id,
        session_id: uuid(&session_id)?,
        participant_id: uuid(&participant_id)?,
        amount: decimal(&amount)?,
        status: parse(&status)?,
        created_at: timestamp(created_at)?,
        resolved_at: opt_timestamp(resolved_at)?,
    })
}

/// Repository for `top_up_requests` rows.
pub struct TopUpRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TopUpRepository<'c> {
    /// Create a repository over a borrowed connection.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Record a new pending request.
    pub async fn insert(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<TopUpRequest, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO top_up_requests (session_id, participant_id, amount, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id.to_string())
        .bind(participant_id.to_string())
        .bind(amount.to_string())
        .bind(TopUpStatus::Pending.as_str())
        .bind(millis(now))
        .execute(&mut *self.conn)
        .await?;

        Ok(TopUpRequest {
            id: result.last_insert_rowid(),
            session_id,
            participant_id,
            amount,
            status: TopUpStatus::Pending,
            created_at: timestamp(millis(now))?,
            resolved_at: None,
        })
    }

    /// Find a request within a session.
    pub async fn find(
        &mut self,
        session_id: SessionId,
        id: i64,
    ) -> Result<Option<TopUpRequest>, DbError> {
        let row = sqlx::query_as::<_, TopUpRow>(
            r#"
            SELECT id, session_id, participant_id, amount, status, created_at, resolved_at
            FROM top_up_requests
            WHERE id = ? AND session_id = ?
            "#,
        )
        .bind(id)
        .bind(session_id.to_string())
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(from_row).transpose()
    }

    /// Pending requests of a session, oldest first.
    pub async fn pending(&mut self, session_id: SessionId) -> Result<Vec<TopUpRequest>, DbError> {
        let rows = sqlx::query_as::<_, TopUpRow>(
            r#"
            SELECT id, session_id, participant_id, amount, status, created_at, resolved_at
            FROM top_up_requests
            WHERE session_id = ? AND status = ?
            ORDER BY id
            "#,
        )
        .bind(session_id.to_string())
        .bind(TopUpStatus::Pending.as_str())
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    /// Mark a request approved or declined.
    pub async fn resolve(
        &mut self,
        id: i64,
        status: TopUpStatus,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query("UPDATE top_up_requests SET status = ?, resolved_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(millis(now))
            .bind(id)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }
}
