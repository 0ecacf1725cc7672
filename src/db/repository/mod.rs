//! Repository layer: entity-scoped database operations.
//!
//! Ids are stored as hyphenated UUID text, dates as ISO text and
//! timestamps as RFC 3339 UTC.

mod arrhythmia;
mod implanted;
mod patient;
mod report;

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use uuid::Uuid;

use super::DatabaseError;

// Re-export all public items from sub-modules
pub use arrhythmia::*;
pub use implanted::*;
pub use patient::*;
pub use report::*;

pub(crate) fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn text_column(row: &Row<'_>, name: &str) -> rusqlite::Result<(usize, Option<String>)> {
    let idx = row.as_ref().column_index(name)?;
    Ok((idx, row.get::<_, Option<String>>(idx)?))
}

pub(crate) fn opt_uuid_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<Uuid>> {
    let (idx, raw) = text_column(row, name)?;
    raw.map(|s| Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn uuid_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Uuid> {
    let idx = row.as_ref().column_index(name)?;
    opt_uuid_column(row, name)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        name.to_string(),
        Type::Null,
    ))
}

pub(crate) fn date_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<NaiveDate>> {
    let (idx, raw) = text_column(row, name)?;
    raw.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|e| conversion_error(idx, e)))
        .transpose()
}

pub(crate) fn timestamp_column(row: &Row<'_>, name: &str) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let (idx, raw) = text_column(row, name)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

pub(crate) fn enum_column<T>(row: &Row<'_>, name: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = DatabaseError>,
{
    let idx = row.as_ref().column_index(name)?;
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_error(idx, e))
}
