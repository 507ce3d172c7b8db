//! Ramp schedule repository: CRUD for the `schedule_days` table.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::{Database, DatabaseError};

/// A ramp schedule row: on warmup day `day`, send `target_emails` messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDayRow {
    pub id: i64,
    pub day: u32,
    pub target_emails: u32,
    pub enabled: bool,
}

fn row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScheduleDayRow> {
    Ok(ScheduleDayRow {
        id: row.get(0)?,
        day: row.get(1)?,
        target_emails: row.get(2)?,
        enabled: row.get(3)?,
    })
}

const COLUMNS: &str = "id, day, target_emails, enabled";

/// Lists all schedule days ordered by day number.
pub fn list(db: &Database) -> Result<Vec<ScheduleDayRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM schedule_days ORDER BY day",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map([], row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Fetches a schedule day by primary key.
pub fn get(db: &Database, id: i64) -> Result<Option<ScheduleDayRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM schedule_days WHERE id = ?1", COLUMNS),
                params![id],
                row_from,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds the enabled schedule entry for a warmup day, if any.
pub fn find_enabled_by_day(
    db: &Database,
    day: u32,
) -> Result<Option<ScheduleDayRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM schedule_days WHERE day = ?1 AND enabled = 1",
                    COLUMNS
                ),
                params![day],
                row_from,
            )
            .optional()?;
        Ok(row)
    })
}

/// Creates a schedule day. Fails if the day number already exists.
pub fn create(
    db: &Database,
    day: u32,
    target_emails: u32,
    enabled: bool,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO schedule_days (day, target_emails, enabled) VALUES (?1, ?2, ?3)",
            params![day, target_emails, enabled],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Updates target count and enabled flag. Returns false when the row is absent.
pub fn update(
    db: &Database,
    id: i64,
    target_emails: u32,
    enabled: bool,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE schedule_days SET target_emails = ?2, enabled = ?3,
             updated_at = datetime('now') WHERE id = ?1",
            params![id, target_emails, enabled],
        )?;
        Ok(changed > 0)
    })
}

/// Deletes a schedule day. Returns false when the row is absent.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM schedule_days WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Inserts or updates an entry keyed by day number. Used for bulk edits.
pub fn upsert_by_day(
    db: &Database,
    day: u32,
    target_emails: u32,
    enabled: bool,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO schedule_days (day, target_emails, enabled) VALUES (?1, ?2, ?3)
             ON CONFLICT(day) DO UPDATE SET
               target_emails = ?2,
               enabled = ?3,
               updated_at = datetime('now')",
            params![day, target_emails, enabled],
        )?;
        Ok(())
    })
}

/// Total number of schedule entries.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM schedule_days", [], |r| r.get(0))?;
        Ok(count)
    })
}

/// Number of enabled schedule entries (the warmup plan length).
pub fn count_enabled(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM schedule_days WHERE enabled = 1",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_create_and_get() {
        let db = test_db();
        let id = create(&db, 1, 5, true).unwrap();

        let row = get(&db, id).unwrap().unwrap();
        assert_eq!(row.day, 1);
        assert_eq!(row.target_emails, 5);
        assert!(row.enabled);

        assert!(get(&db, 9999).unwrap().is_none());
    }

    #[test]
    fn test_day_number_is_unique() {
        let db = test_db();
        create(&db, 1, 5, true).unwrap();
        assert!(create(&db, 1, 10, true).is_err());
    }

    #[test]
    fn test_find_enabled_by_day() {
        let db = test_db();
        create(&db, 1, 5, true).unwrap();
        create(&db, 2, 10, false).unwrap();

        assert!(find_enabled_by_day(&db, 1).unwrap().is_some());
        // Disabled entries do not match.
        assert!(find_enabled_by_day(&db, 2).unwrap().is_none());
        assert!(find_enabled_by_day(&db, 3).unwrap().is_none());
    }

    #[test]
    fn test_update_and_delete() {
        let db = test_db();
        let id = create(&db, 1, 5, true).unwrap();

        assert!(update(&db, id, 25, false).unwrap());
        let row = get(&db, id).unwrap().unwrap();
        assert_eq!(row.target_emails, 25);
        assert!(!row.enabled);

        assert!(delete(&db, id).unwrap());
        assert!(!delete(&db, id).unwrap());
        assert!(get(&db, id).unwrap().is_none());
    }

    #[test]
    fn test_upsert_by_day() {
        let db = test_db();
        upsert_by_day(&db, 3, 15, true).unwrap();
        upsert_by_day(&db, 3, 20, true).unwrap();

        let rows = list(&db).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target_emails, 20);
    }

    #[test]
    fn test_counts() {
        let db = test_db();
        create(&db, 1, 5, true).unwrap();
        create(&db, 2, 10, true).unwrap();
        create(&db, 3, 15, false).unwrap();

        assert_eq!(count(&db).unwrap(), 3);
        assert_eq!(count_enabled(&db).unwrap(), 2);
    }

    #[test]
    fn test_list_ordered_by_day() {
        let db = test_db();
        create(&db, 5, 25, true).unwrap();
        create(&db, 1, 5, true).unwrap();
        create(&db, 3, 15, true).unwrap();

        let days: Vec<u32> = list(&db).unwrap().iter().map(|r| r.day).collect();
        assert_eq!(days, vec![1, 3, 5]);
    }
}
