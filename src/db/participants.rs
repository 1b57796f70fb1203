//! Participant aggregate repository.
//!
//! Rows here are a cache of the transaction log; the ledger engine updates
//! them in the same SQL transaction that appends to `transactions`.

use super::DbError;
use super::convert::{decimal, millis, opt_decimal, opt_timestamp, parse, timestamp, uuid};
use pitboss_proto::{ParticipantId, ParticipantRecord, SessionId};
use sqlx::SqliteConnection;

type ParticipantRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    i64,
    Option<i64>,
);

fn from_row(row: ParticipantRow) -> Result<ParticipantRecord, DbError> {
    let (session_id, participant_id, status, contributed, withdrawn, final_balance, joined_at, left_at) =
        row;
    Ok(ParticipantRecord {
        session_id: uuid(&session_id)?,
        participant_id: uuid(&participant_id)?,
        status: parse(&status)?,
        contributed: decimal(&contributed)?,
        withdrawn: opt_decimal(withdrawn)?,
        final_balance: opt_decimal(final_balance)?,
        joined_at: timestamp(joined_at)?,
        left_at: opt_timestamp(left_at)?,
    })
}

/// Repository for `session_participants` rows.
pub struct ParticipantRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ParticipantRepository<'c> {
    /// Create a repository over a borrowed connection.
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Find one participant's record.
    pub async fn find(
        &mut self,
        session_id: SessionId,
        participant_id: ParticipantId,
    ) -> Result<Option<ParticipantRecord>, DbError> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT session_id, participant_id, status, contributed, withdrawn,
                   final_balance, joined_at, left_at
            FROM session_participants
            WHERE session_id = ? AND participant_id = ?
            "#,
        )
        .bind(session_id.to_string())
        .bind(participant_id.to_string())
        .fetch_optional(&mut *self.conn)
        .await?;

        row.map(from_row).transpose()
    }

    /// All records of a session, in join order.
    pub async fn list(&mut self, session_id: SessionId) -> Result<Vec<ParticipantRecord>, DbError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT session_id, participant_id, status, contributed, withdrawn,
                   final_balance, joined_at, left_at
            FROM session_participants
            WHERE session_id = ?
            ORDER BY joined_at, participant_id
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(from_row).collect()
    }

    /// Insert or overwrite a record.
    pub async fn save(&mut self, record: &ParticipantRecord) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO session_participants (session_id, participant_id, status, contributed,
                                              withdrawn, final_balance, joined_at, left_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (session_id, participant_id) DO UPDATE SET
                status = excluded.status,
                contributed = excluded.contributed,
                withdrawn = excluded.withdrawn,
                final_balance = excluded.final_balance,
                left_at = excluded.left_at
            "#,
        )
        .bind(record.session_id.to_string())
        .bind(record.participant_id.to_string())
        .bind(record.status.as_str())
        .bind(record.contributed.to_string())
        .bind(record.withdrawn.map(|d| d.to_string()))
        .bind(record.final_balance.map(|d| d.to_string()))
        .bind(millis(record.joined_at))
        .bind(record.left_at.map(millis))
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }
}
