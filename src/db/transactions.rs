//! Append-only transaction log.

use super::DbError;
use super::convert::{decimal, millis, parse, timestamp, uuid};
use chrono::{DateTime, Utc};
use pitboss_proto::{ParticipantId, SessionId, Transaction, TransactionKind};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;

type TransactionRow = (i64, String, String, String, String, Option<String>, i64);

fn from_row(row: TransactionRow) -> Result<Transaction, DbError> {
    let (id, session_id, participant_id, kind, amount, note, created_at) = row;
    Ok(Transaction {
        id,
        session_id: uuid(&session_id)?,
        participant_id: uuid(&participant_id)?,
        kind: parse(&kind)?,
        amount: decimal(&amount)?,
        note,
        created_at: timestamp(created_at)?,
    })
}

/// Repository for the `transactions` table. Rows are never updated or deleted.
pub struct TransactionRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TransactionRepository<'c> {
    /// Create a repository over a borrowed connection.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Append an entry and return it with its assigned id.
    pub async fn append(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
        kind: TransactionKind,
        amount: Decimal,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transaction, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (session_id, participant_id, kind, amount, note, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(session_id.to_string())
        .bind(participant_id.to_string())
        .bind(kind.as_str())
        .bind(amount.to_string())
        .bind(note.as_deref())
        .bind(millis(now))
        .execute(&mut *self.conn)
        .await?;

        Ok(Transaction {
            id: result.last_insert_rowid(),
            session_id,
            participant_id,
            kind,
            amount,
            note,
            created_at: timestamp(millis(now))?,
        })
    }

    /// Most recent entries of a session, newest first.
    pub async fn recent(
        &mut self,
        session_id: SessionId,
        limit: u32,
    ) -> Result<Vec<Transaction>, DbError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, session_id, participant_id, kind, amount, note, created_at
            FROM transactions
            WHERE session_id = ?
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    /// Every entry for one participant, oldest first.
    pub async fn for_participant(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<Vec<Transaction>, DbError> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, session_id, participant_id, kind, amount, note, created_at
            FROM transactions
            WHERE session_id = ? AND participant_id = ?
            ORDER BY id
            "#,
        )
        .bind(session_id.to_string())
        .bind(participant_id.to_string())
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    /// Re-derive a participant's contributed total from the log.
    pub async fn contributed_total(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<Decimal, DbError> {
        let entries = self.for_participant(session_id, participant_id).await?;
        entries
            .iter()
            .filter(|t| t.kind.counts_toward_contributed())
            .try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t.amount))
            .ok_or_else(|| DbError::Corrupt("contributed total overflows".into()))
    }
}
