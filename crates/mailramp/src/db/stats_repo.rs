//! Daily statistics repository.
//!
//! Statistics are a derived view: each row is recomputed wholesale from the
//! message table and replaced by date, never accumulated incrementally.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::message_repo::DayCounts;
use super::{Database, DatabaseError};

/// A daily statistics row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatRow {
    pub date: String,
    pub emails_sent: u32,
    pub emails_inbox: u32,
    pub emails_spam: u32,
    pub emails_failed: u32,
    pub emails_bounced: u32,
    pub success_rate: f64,
    pub spam_rate: f64,
}

/// Derives success and spam rates from raw counts. Both are percentages;
/// a day with nothing sent has rate 0, not NaN.
pub fn derive_rates(counts: &DayCounts) -> (f64, f64) {
    if counts.sent == 0 {
        return (0.0, 0.0);
    }
    let sent = counts.sent as f64;
    (
        counts.inbox as f64 / sent * 100.0,
        counts.spam as f64 / sent * 100.0,
    )
}

/// Replaces the statistics row for a date with freshly derived values.
/// Idempotent: upserting the same counts twice leaves identical state.
pub fn upsert(db: &Database, date: &str, counts: &DayCounts) -> Result<(), DatabaseError> {
    let (success_rate, spam_rate) = derive_rates(counts);

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO daily_stats (date, emails_sent, emails_inbox, emails_spam,
             emails_failed, emails_bounced, success_rate, spam_rate)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(date) DO UPDATE SET
               emails_sent = ?2,
               emails_inbox = ?3,
               emails_spam = ?4,
               emails_failed = ?5,
               emails_bounced = ?6,
               success_rate = ?7,
               spam_rate = ?8,
               updated_at = datetime('now')",
            params![
                date,
                counts.sent,
                counts.inbox,
                counts.spam,
                counts.failed,
                counts.bounced,
                success_rate,
                spam_rate,
            ],
        )?;
        Ok(())
    })
}

fn row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<DailyStatRow> {
    Ok(DailyStatRow {
        date: row.get(0)?,
        emails_sent: row.get(1)?,
        emails_inbox: row.get(2)?,
        emails_spam: row.get(3)?,
        emails_failed: row.get(4)?,
        emails_bounced: row.get(5)?,
        success_rate: row.get(6)?,
        spam_rate: row.get(7)?,
    })
}

const COLUMNS: &str = "date, emails_sent, emails_inbox, emails_spam, emails_failed,
    emails_bounced, success_rate, spam_rate";

/// Fetches the statistics row for a date.
pub fn get_by_date(db: &Database, date: &str) -> Result<Option<DailyStatRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM daily_stats WHERE date = ?1", COLUMNS),
                params![date],
                row_from,
            )
            .optional()?;
        Ok(row)
    })
}

/// Most recent statistics rows, newest first.
pub fn recent(db: &Database, limit: u32) -> Result<Vec<DailyStatRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM daily_stats ORDER BY date DESC LIMIT ?1",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
