//! Column encoding shared by the SQLite repositories.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
#[error("{0}")]
struct CorruptValue(String);

fn corrupt(index: usize, kind: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, kind, Box::new(CorruptValue(message)))
}

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn opt_millis(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(to_millis)
}

pub(crate) fn from_millis(index: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt(index, Type::Integer, format!("timestamp out of range: {millis}")))
}

pub(crate) fn opt_from_millis(index: usize, millis: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    millis.map(|value| from_millis(index, value)).transpose()
}

pub(crate) fn day_text(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_day(index: usize, text: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .map_err(|err| corrupt(index, Type::Text, format!("invalid day {text:?}: {err}")))
}

/// Status-like text column parsed through its `FromStr` impl.
pub(crate) fn parse_text<T>(index: usize, text: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    text.parse().map_err(|err| corrupt(index, Type::Text, err))
}

pub(crate) fn parse_json<T: DeserializeOwned>(index: usize, text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|err| corrupt(index, Type::Text, err.to_string()))
}

pub(crate) fn to_u32(index: usize, value: i64) -> rusqlite::Result<u32> {
    u32::try_from(value).map_err(|_| corrupt(index, Type::Integer, format!("counter out of range: {value}")))
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
pub(crate) fn like_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
