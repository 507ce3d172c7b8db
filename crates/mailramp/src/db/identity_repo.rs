//! Mailbox identity repository: the configured sender and recipient pools.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::types::MailboxRole;

use super::{Database, DatabaseError};

/// A configured mailbox. `imap_credential` holds the encrypted credential
/// for recipients whose inbox the checker may log into.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailboxIdentityRow {
    pub id: i64,
    pub email: String,
    pub role: MailboxRole,
    pub verified: bool,
    #[serde(skip_serializing)]
    pub imap_credential: Option<String>,
}

fn row_from(row: &rusqlite::Row<'_>) -> rusqlite::Result<MailboxIdentityRow> {
    let role: String = row.get(2)?;
    Ok(MailboxIdentityRow {
        id: row.get(0)?,
        email: row.get(1)?,
        role: MailboxRole::parse(&role).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("invalid mailbox role '{}'", role).into(),
            )
        })?,
        verified: row.get(3)?,
        imap_credential: row.get(4)?,
    })
}

const COLUMNS: &str = "id, email, role, verified, imap_credential";

/// Inserts a mailbox identity.
pub fn insert(
    db: &Database,
    email: &str,
    role: MailboxRole,
    credential: Option<&str>,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO mailbox_identities (email, role, verified, imap_credential)
             VALUES (?1, ?2, 0, ?3)",
            params![email, role.as_str(), credential],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds an identity by its email address.
pub fn find_by_email(
    db: &Database,
    email: &str,
) -> Result<Option<MailboxIdentityRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM mailbox_identities WHERE email = ?1", COLUMNS),
                params![email],
                row_from,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists identities with a given role, ordered by address.
pub fn list_by_role(
    db: &Database,
    role: MailboxRole,
) -> Result<Vec<MailboxIdentityRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mailbox_identities WHERE role = ?1 ORDER BY email",
            COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![role.as_str()], row_from)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Total number of identities.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM mailbox_identities", [], |r| r.get(0))?;
        Ok(count)
    })
}
