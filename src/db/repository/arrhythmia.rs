use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use super::{format_timestamp, timestamp_column, uuid_column};
use crate::db::DatabaseError;
use crate::models::Arrhythmia;

fn arrhythmia_from_row(row: &Row<'_>) -> rusqlite::Result<Arrhythmia> {
    Ok(Arrhythmia {
        id: uuid_column(row, "id")?,
        report_id: uuid_column(row, "report_id")?,
        kind: row.get("kind")?,
        occurred_at: timestamp_column(row, "occurred_at")?,
        duration: row.get("duration")?,
        therapy: row.get("therapy")?,
    })
}

pub fn insert_arrhythmia(conn: &Connection, episode: &Arrhythmia) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO arrhythmias (id, report_id, kind, occurred_at, duration, therapy)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            episode.id.to_string(),
            episode.report_id.to_string(),
            episode.kind,
            episode.occurred_at.as_ref().map(format_timestamp),
            episode.duration,
            episode.therapy,
        ],
    )?;
    Ok(())
}

/// Episodes of one report in chronological order; undated episodes last.
pub fn list_arrhythmias_for_report(
    conn: &Connection,
    report_id: &Uuid,
) -> Result<Vec<Arrhythmia>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, report_id, kind, occurred_at, duration, therapy
         FROM arrhythmias WHERE report_id = ?1
         ORDER BY occurred_at IS NULL, occurred_at, rowid",
    )?;
    let rows = stmt.query_map(params![report_id.to_string()], arrhythmia_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(DatabaseError::from)
}
