//! Column encodings shared by the repositories.
//!
//! Ids are stored as hyphenated UUID text, amounts as decimal text (scale
//! preserved) and timestamps as unix milliseconds.

use super::DbError;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

pub(super) fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(super) fn timestamp(ms: i64) -> Result<DateTime<Utc>, DbError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| DbError::Corrupt(format!("timestamp out of range: {ms}")))
}

pub(super) fn opt_timestamp(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, DbError> {
    ms.map(timestamp).transpose()
}

pub(super) fn uuid(text: &str) -> Result<Uuid, DbError> {
    Uuid::parse_str(text).map_err(|e| DbError::Corrupt(format!("bad uuid '{text}': {e}")))
}

pub(super) fn decimal(text: &str) -> Result<Decimal, DbError> {
    Decimal::from_str(text).map_err(|e| DbError::Corrupt(format!("bad decimal '{text}': {e}")))
}

pub(super) fn opt_decimal(text: Option<String>) -> Result<Option<Decimal>, DbError> {
    text.as_deref().map(decimal).transpose()
}

pub(super) fn parse<T>(text: &str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.parse::<T>()
        .map_err(|e| DbError::Corrupt(e.to_string()))
}
