//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const CREATE_SCHEDULE_DAYS: &str = "
CREATE TABLE schedule_days (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    day           INTEGER NOT NULL UNIQUE,
    target_emails INTEGER NOT NULL DEFAULT 0,
    enabled       INTEGER NOT NULL DEFAULT 1,
    created_at    TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
);
";

const CREATE_EXECUTIONS: &str = "
CREATE TABLE executions (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    schedule_day_id INTEGER NOT NULL REFERENCES schedule_days(id),
    date            TEXT NOT NULL UNIQUE,
    sent_count      INTEGER NOT NULL DEFAULT 0,
    completed_at    TEXT,
    created_at      TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX idx_executions_schedule_day ON executions(schedule_day_id);
";

const CREATE_MESSAGES: &str = "
CREATE TABLE messages (
    id                  INTEGER PRIMARY KEY AUTOINCREMENT,
    sender              TEXT NOT NULL,
    recipient           TEXT NOT NULL,
    subject             TEXT NOT NULL,
    body                TEXT NOT NULL,
    category            TEXT NOT NULL,
    provider_message_id TEXT UNIQUE,
    send_status         TEXT NOT NULL,
    delivery_status     TEXT NOT NULL DEFAULT 'pending',
    sent_at             TEXT,
    check_scheduled_at  TEXT,
    checked_at          TEXT,
    is_read             INTEGER NOT NULL DEFAULT 0,
    moved_to_folder     TEXT,
    created_at          TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX idx_messages_delivery_status ON messages(delivery_status);
CREATE INDEX idx_messages_check_scheduled ON messages(check_scheduled_at);
CREATE INDEX idx_messages_sent_at ON messages(sent_at);
CREATE INDEX idx_messages_recipient ON messages(recipient);
";

const CREATE_DAILY_STATS: &str = "
CREATE TABLE daily_stats (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    date           TEXT NOT NULL UNIQUE,
    emails_sent    INTEGER NOT NULL DEFAULT 0,
    emails_inbox   INTEGER NOT NULL DEFAULT 0,
    emails_spam    INTEGER NOT NULL DEFAULT 0,
    emails_failed  INTEGER NOT NULL DEFAULT 0,
    emails_bounced INTEGER NOT NULL DEFAULT 0,
    success_rate   REAL NOT NULL DEFAULT 0,
    spam_rate      REAL NOT NULL DEFAULT 0,
    created_at     TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at     TEXT NOT NULL DEFAULT (datetime('now'))
);
";

const CREATE_MAILBOX_IDENTITIES: &str = "
CREATE TABLE mailbox_identities (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    email           TEXT NOT NULL UNIQUE,
    role            TEXT NOT NULL,
    verified        INTEGER NOT NULL DEFAULT 0,
    imap_credential TEXT,
    created_at      TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX idx_mailbox_identities_role ON mailbox_identities(role);
";

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_schedule_days_table",
        sql: CREATE_SCHEDULE_DAYS,
    },
    Migration {
        version: 2,
        description: "create_executions_table",
        sql: CREATE_EXECUTIONS,
    },
    Migration {
        version: 3,
        description: "create_messages_table",
        sql: CREATE_MESSAGES,
    },
    Migration {
        version: 4,
        description: "create_daily_stats_table",
        sql: CREATE_DAILY_STATS,
    },
    Migration {
        version: 5,
        description: "create_mailbox_identities_table",
        sql: CREATE_MAILBOX_IDENTITIES,
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    // Create the migrations tracking table.
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}
