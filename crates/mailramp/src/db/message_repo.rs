//! Message repository: one row per warmup email ever dispatched.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::types::{ContentCategory, DeliveryStatus, SendStatus};

use super::{date_str, Database, DatabaseError};

/// A message to insert at send time. Delivery status starts as `pending`.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub category: ContentCategory,
    pub provider_message_id: Option<String>,
    pub send_status: SendStatus,
    pub sent_at: String,
    pub check_scheduled_at: String,
}

/// A stored message row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRow {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub category: ContentCategory,
    pub provider_message_id: Option<String>,
    pub send_status: SendStatus,
    pub delivery_status: DeliveryStatus,
    pub sent_at: Option<String>,
    pub check_scheduled_at: Option<String>,
    pub checked_at: Option<String>,
    pub is_read: bool,
    pub moved_to_folder: Option<String>,
}

/// Per-day message counts used for the statistics rollup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DayCounts {
    pub sent: u32,
    pub inbox: u32,
    pub spam: u32,
    pub failed: u32,
    pub bounced: u32,
}

/// Lifetime totals for the progress view.
#[derive(Debug, Clone, Copy, Default)]
pub struct Totals {
    pub sent: u64,
    pub inbox: u64,
    pub spam: u64,
}

fn conversion_err(what: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("invalid {} '{}'", what, value).into(),
    )
}

fn row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    let category: String = row.get(5)?;
    let send_status: String = row.get(7)?;
    let delivery_status: String = row.get(8)?;

    Ok(MessageRow {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        subject: row.get(3)?,
        body: row.get(4)?,
        category: ContentCategory::parse(&category)
            .ok_or_else(|| conversion_err("content category", &category))?,
        provider_message_id: row.get(6)?,
        send_status: SendStatus::parse(&send_status)
            .ok_or_else(|| conversion_err("send status", &send_status))?,
        delivery_status: DeliveryStatus::parse(&delivery_status)
            .ok_or_else(|| conversion_err("delivery status", &delivery_status))?,
        sent_at: row.get(9)?,
        check_scheduled_at: row.get(10)?,
        checked_at: row.get(11)?,
        is_read: row.get(12)?,
        moved_to_folder: row.get(13)?,
    })
}

const COLUMNS: &str = "id, sender, recipient, subject, body, category, provider_message_id,
    send_status, delivery_status, sent_at, check_scheduled_at, checked_at,
    is_read, moved_to_folder";

/// Inserts a freshly dispatched message and returns its id.
pub fn insert(db: &Database, message: &NewMessage) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO messages (sender, recipient, subject, body, category,
             provider_message_id, send_status, delivery_status, sent_at, check_scheduled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, ?9)",
            params![
                message.sender,
                message.recipient,
                message.subject,
                message.body,
                message.category.as_str(),
                message.provider_message_id,
                message.send_status.as_str(),
                message.sent_at,
                message.check_scheduled_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Fetches a message by id.
pub fn get(db: &Database, id: i64) -> Result<Option<MessageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM messages WHERE id = ?1", COLUMNS),
                params![id],
                row_from,
            )
            .optional()?;
        Ok(row)
    })
}

/// Selects up to `limit` pending messages whose scheduled check time has
/// arrived, oldest first. The limit bounds mailbox sessions per sweep.
pub fn due_for_check(
    db: &Database,
    now: &str,
    limit: u32,
) -> Result<Vec<MessageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages
             WHERE delivery_status = 'pending'
               AND check_scheduled_at IS NOT NULL
               AND check_scheduled_at <= ?1
               AND checked_at IS NULL
             ORDER BY check_scheduled_at
             LIMIT ?2",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![now, limit], row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Records the delivery verdict for a message. Setting `checked_at`
/// together with the status keeps the invariant that a checked message is
/// never left `pending`.
pub fn mark_checked(
    db: &Database,
    id: i64,
    status: DeliveryStatus,
    checked_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE messages SET delivery_status = ?2, checked_at = ?3,
             updated_at = datetime('now') WHERE id = ?1",
            params![id, status.as_str(), checked_at],
        )?;
        Ok(())
    })
}

/// Records simulated engagement (read flag, folder move) on a message.
pub fn record_engagement(
    db: &Database,
    id: i64,
    is_read: bool,
    moved_to_folder: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE messages SET is_read = ?2, moved_to_folder = ?3,
             updated_at = datetime('now') WHERE id = ?1",
            params![id, is_read, moved_to_folder],
        )?;
        Ok(())
    })
}

/// Counts messages sent on a calendar day, broken down by outcome.
pub fn day_counts(db: &Database, date: NaiveDate) -> Result<DayCounts, DatabaseError> {
    let day_start = format!("{}T00:00:00", date_str(date));
    let day_end = format!("{}T00:00:00", date_str(date + chrono::Days::new(1)));

    db.with_conn(|conn| {
        let counts = conn.query_row(
            "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN delivery_status = 'inbox' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN delivery_status = 'spam' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN send_status = 'failed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN send_status = 'bounced' THEN 1 ELSE 0 END), 0)
             FROM messages WHERE sent_at >= ?1 AND sent_at < ?2",
            params![day_start, day_end],
            |row| {
                Ok(DayCounts {
                    sent: row.get(0)?,
                    inbox: row.get(1)?,
                    spam: row.get(2)?,
                    failed: row.get(3)?,
                    bounced: row.get(4)?,
                })
            },
        )?;
        Ok(counts)
    })
}

/// Lifetime totals across all messages.
pub fn totals(db: &Database) -> Result<Totals, DatabaseError> {
    db.with_conn(|conn| {
        let totals = conn.query_row(
            "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN delivery_status = 'inbox' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN delivery_status = 'spam' THEN 1 ELSE 0 END), 0)
             FROM messages",
            [],
            |row| {
                Ok(Totals {
                    sent: row.get(0)?,
                    inbox: row.get(1)?,
                    spam: row.get(2)?,
                })
            },
        )?;
        Ok(totals)
    })
}

/// Most recently sent messages, newest first.
pub fn recent(db: &Database, limit: u32) -> Result<Vec<MessageRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages ORDER BY id DESC LIMIT ?1",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn sample(recipient: &str, sent_at: &str, check_at: &str) -> NewMessage {
        NewMessage {
            sender: "warm@sender.example".to_string(),
            recipient: recipient.to_string(),
            subject: "Quick Question".to_string(),
            body: "Just checking in.".to_string(),
            category: ContentCategory::Personal,
            provider_message_id: None,
            send_status: SendStatus::Sent,
            sent_at: sent_at.to_string(),
            check_scheduled_at: check_at.to_string(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = test_db();
        let id = insert(
            &db,
            &sample("r@x.com", "2026-08-05T09:00:00+00:00", "2026-08-05T09:15:00+00:00"),
        )
        .unwrap();

        let row = get(&db, id).unwrap().unwrap();
        assert_eq!(row.recipient, "r@x.com");
        assert_eq!(row.delivery_status, DeliveryStatus::Pending);
        assert_eq!(row.send_status, SendStatus::Sent);
        assert!(row.checked_at.is_none());
        assert!(!row.is_read);
    }

    #[test]
    fn test_provider_message_id_unique_but_nullable() {
        let db = test_db();
        let mut first = sample("r@x.com", "2026-08-05T09:00:00+00:00", "2026-08-05T09:15:00+00:00");
        first.provider_message_id = Some("msg-1".to_string());
        insert(&db, &first).unwrap();

        // Duplicate provider id is rejected.
        assert!(insert(&db, &first).is_err());

        // Multiple NULL ids (failed sends) are fine.
        insert(
            &db,
            &sample("r@x.com", "2026-08-05T09:01:00+00:00", "2026-08-05T09:16:00+00:00"),
        )
        .unwrap();
        insert(
            &db,
            &sample("r@x.com", "2026-08-05T09:02:00+00:00", "2026-08-05T09:17:00+00:00"),
        )
        .unwrap();
    }

    #[test]
    fn test_due_for_check_filters_and_caps() {
        let db = test_db();
        // 120 due messages.
        for i in 0..120 {
            insert(
                &db,
                &sample(
                    "r@x.com",
                    "2026-08-05T09:00:00+00:00",
                    &format!("2026-08-05T09:{:02}:00+00:00", i % 60),
                ),
            )
            .unwrap();
        }
        // One not yet due.
        insert(
            &db,
            &sample("r@x.com", "2026-08-05T09:00:00+00:00", "2026-08-05T23:00:00+00:00"),
        )
        .unwrap();

        let due = due_for_check(&db, "2026-08-05T12:00:00+00:00", 50).unwrap();
        assert_eq!(due.len(), 50);
    }

    #[test]
    fn test_due_for_check_skips_checked() {
        let db = test_db();
        let id = insert(
            &db,
            &sample("r@x.com", "2026-08-05T09:00:00+00:00", "2026-08-05T09:15:00+00:00"),
        )
        .unwrap();

        mark_checked(&db, id, DeliveryStatus::Inbox, "2026-08-05T10:00:00+00:00").unwrap();

        let due = due_for_check(&db, "2026-08-05T12:00:00+00:00", 50).unwrap();
        assert!(due.is_empty());

        let row = get(&db, id).unwrap().unwrap();
        assert_eq!(row.delivery_status, DeliveryStatus::Inbox);
        assert!(row.checked_at.is_some());
    }

    #[test]
    fn test_record_engagement() {
        let db = test_db();
        let id = insert(
            &db,
            &sample("r@x.com", "2026-08-05T09:00:00+00:00", "2026-08-05T09:15:00+00:00"),
        )
        .unwrap();

        record_engagement(&db, id, true, Some("Archive")).unwrap();

        let row = get(&db, id).unwrap().unwrap();
        assert!(row.is_read);
        assert_eq!(row.moved_to_folder.as_deref(), Some("Archive"));
    }

    #[test]
    fn test_day_counts() {
        let db = test_db();
        let date = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();

        for i in 0..3 {
            let id = insert(
                &db,
                &sample(
                    "r@x.com",
                    &format!("2026-08-05T09:0{}:00+00:00", i),
                    "2026-08-05T09:15:00+00:00",
                ),
            )
            .unwrap();
            mark_checked(&db, id, DeliveryStatus::Inbox, "2026-08-05T10:00:00+00:00").unwrap();
        }
        let spam_id = insert(
            &db,
            &sample("r@x.com", "2026-08-05T09:30:00+00:00", "2026-08-05T09:45:00+00:00"),
        )
        .unwrap();
        mark_checked(&db, spam_id, DeliveryStatus::Spam, "2026-08-05T10:00:00+00:00").unwrap();

        let mut failed = sample("r@x.com", "2026-08-05T09:40:00+00:00", "2026-08-05T09:55:00+00:00");
        failed.send_status = SendStatus::Failed;
        insert(&db, &failed).unwrap();

        // A message from another day does not count.
        insert(
            &db,
            &sample("r@x.com", "2026-08-04T09:00:00+00:00", "2026-08-04T09:15:00+00:00"),
        )
        .unwrap();

        let counts = day_counts(&db, date).unwrap();
        assert_eq!(counts.sent, 5);
        assert_eq!(counts.inbox, 3);
        assert_eq!(counts.spam, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.bounced, 0);
    }

    #[test]
    fn test_day_counts_empty() {
        let db = test_db();
        let counts = day_counts(&db, NaiveDate::from_ymd_opt(2026, 8, 5).unwrap()).unwrap();
        assert_eq!(counts, DayCounts::default());
    }

    #[test]
    fn test_totals_and_recent() {
        let db = test_db();
        for i in 0..4 {
            let id = insert(
                &db,
                &sample(
                    &format!("r{}@x.com", i),
                    "2026-08-05T09:00:00+00:00",
                    "2026-08-05T09:15:00+00:00",
                ),
            )
            .unwrap();
            if i < 2 {
                mark_checked(&db, id, DeliveryStatus::Inbox, "2026-08-05T10:00:00+00:00")
                    .unwrap();
            }
        }

        let t = totals(&db).unwrap();
        assert_eq!(t.sent, 4);
        assert_eq!(t.inbox, 2);
        assert_eq!(t.spam, 0);

        let rows = recent(&db, 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].recipient, "r3@x.com");
    }
}
