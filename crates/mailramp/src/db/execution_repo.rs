//! Execution repository: one row per calendar day the batch actually ran.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A batch execution row. `date` is a `YYYY-MM-DD` string, unique per day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRow {
    pub id: i64,
    pub schedule_day_id: i64,
    pub date: String,
    pub sent_count: u32,
    pub completed_at: Option<String>,
}

impl ExecutionRow {
    /// Whether the batch for this day ran to completion.
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

fn row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExecutionRow> {
    Ok(ExecutionRow {
        id: row.get(0)?,
        schedule_day_id: row.get(1)?,
        date: row.get(2)?,
        sent_count: row.get(3)?,
        completed_at: row.get(4)?,
    })
}

const COLUMNS: &str = "id, schedule_day_id, date, sent_count, completed_at";

/// Finds the execution for a calendar date.
pub fn find_by_date(db: &Database, date: &str) -> Result<Option<ExecutionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM executions WHERE date = ?1", COLUMNS),
                params![date],
                row_from,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns the date of the earliest execution, which anchors the warmup
/// day counter.
pub fn first_date(db: &Database) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let date = conn
            .query_row("SELECT MIN(date) FROM executions", [], |r| {
                r.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten();
        Ok(date)
    })
}

/// Creates an execution row for a date with a zero sent count.
pub fn create(db: &Database, schedule_day_id: i64, date: &str) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO executions (schedule_day_id, date, sent_count) VALUES (?1, ?2, 0)",
            params![schedule_day_id, date],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Increments the sent counter. Called once per dispatched message so the
/// count stays accurate even if the batch is interrupted mid-loop.
pub fn increment_sent(db: &Database, id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE executions SET sent_count = sent_count + 1,
             updated_at = datetime('now') WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    })
}

/// Stamps the completion time at the end of a batch.
pub fn complete(db: &Database, id: i64, completed_at: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE executions SET completed_at = ?2, updated_at = datetime('now')
             WHERE id = ?1",
            params![id, completed_at],
        )?;
        Ok(())
    })
}

/// Most recent executions, newest first.
pub fn recent(db: &Database, limit: u32) -> Result<Vec<ExecutionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM executions ORDER BY date DESC LIMIT ?1",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
