//! Mailbox inspection: classifies where a sent message landed by searching
//! the recipient's INBOX and the conventional spam folders over IMAP, and
//! offers best-effort read/move operations for engagement simulation.

use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use secrecy::SecretString;

pub mod client;
pub mod error;

pub use error::MailboxError;

use crate::types::DeliveryStatus;
use client::ImapConnection;

/// The folder searched first.
const INBOX: &str = "INBOX";

/// Conventional spam folder names, searched in this order after INBOX.
/// Folders that do not exist on a given server are skipped.
pub const SPAM_FOLDERS: [&str; 5] = ["[Gmail]/Spam", "Spam", "Junk", "SPAM", "[Gmail]/Junk"];

/// IMAP server coordinates shared by every mailbox in the pool.
#[derive(Debug, Clone)]
pub struct MailboxEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

/// Result of a placement check. Errors are encoded here rather than
/// returned: a failed check is itself a classification.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub found: bool,
    pub status: DeliveryStatus,
    pub folder: Option<String>,
    pub error: Option<String>,
}

impl CheckOutcome {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            found: false,
            status: DeliveryStatus::Failed,
            folder: None,
            error: Some(error.into()),
        }
    }
}

/// Inspects a recipient mailbox for a delivered message.
#[async_trait]
pub trait MailboxChecker: Send + Sync {
    /// Classifies where the message identified by `message_id` (preferred)
    /// or `subject` landed.
    async fn check(
        &self,
        address: &str,
        credential: &SecretString,
        message_id: Option<&str>,
        subject: Option<&str>,
    ) -> CheckOutcome;

    /// Marks the first matching INBOX message as read. Best-effort.
    async fn mark_read(&self, address: &str, credential: &SecretString, subject: &str) -> bool;

    /// Moves the first matching INBOX message to `target_folder`. Best-effort.
    async fn move_to_folder(
        &self,
        address: &str,
        credential: &SecretString,
        target_folder: &str,
        subject: &str,
    ) -> bool;
}

/// Builds the IMAP SEARCH query: message id header when available, else
/// subject, else everything received today.
fn search_query(message_id: Option<&str>, subject: Option<&str>) -> String {
    if let Some(id) = message_id {
        format!("HEADER Message-ID {}", quote(id))
    } else if let Some(subject) = subject {
        format!("SUBJECT {}", quote(subject))
    } else {
        format!("SINCE {}", Utc::now().format("%d-%b-%Y"))
    }
}

/// Quotes a search operand, escaping backslashes and double quotes.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Maps the folder a message was located in to a check outcome.
fn outcome_for_folder(folder: Option<&str>) -> CheckOutcome {
    match folder {
        Some(INBOX) => CheckOutcome {
            found: true,
            status: DeliveryStatus::Inbox,
            folder: Some(INBOX.to_string()),
            error: None,
        },
        Some(spam_folder) => CheckOutcome {
            found: true,
            status: DeliveryStatus::Spam,
            folder: Some(spam_folder.to_string()),
            error: None,
        },
        None => CheckOutcome {
            found: false,
            status: DeliveryStatus::Unknown,
            folder: None,
            error: None,
        },
    }
}

/// IMAP-backed mailbox checker.
pub struct ImapChecker {
    endpoint: MailboxEndpoint,
}

impl ImapChecker {
    pub fn new(endpoint: MailboxEndpoint) -> Self {
        Self { endpoint }
    }

    async fn try_check(
        &self,
        address: &str,
        credential: &SecretString,
        message_id: Option<&str>,
        subject: Option<&str>,
    ) -> error::Result<CheckOutcome> {
        let mut conn = ImapConnection::connect(&self.endpoint, address, credential).await?;
        let query = search_query(message_id, subject);

        let located = self.locate(&mut conn, &query).await;
        let logout = conn.logout().await;
        if let Err(e) = logout {
            warn!("IMAP logout failed for {}: {}", address, e);
        }

        located.map(|folder| outcome_for_folder(folder))
    }

    /// Searches INBOX, then each conventional spam folder in order.
    /// Returns the first folder containing a match. Missing spam folders
    /// are tolerated; an INBOX failure is not.
    async fn locate(
        &self,
        conn: &mut ImapConnection,
        query: &str,
    ) -> error::Result<Option<&'static str>> {
        let inbox_hits = conn.search_folder(INBOX, query).await?;
        if !inbox_hits.is_empty() {
            return Ok(Some(INBOX));
        }

        for folder in SPAM_FOLDERS {
            match conn.search_folder(folder, query).await {
                Ok(hits) if !hits.is_empty() => return Ok(Some(folder)),
                Ok(_) => {}
                Err(_) => {
                    // Folder may not exist on this server; try the next.
                }
            }
        }

        Ok(None)
    }

    /// Finds the first INBOX match for a writable operation.
    async fn first_inbox_match(
        &self,
        conn: &mut ImapConnection,
        subject: &str,
    ) -> error::Result<Option<u32>> {
        let query = search_query(None, Some(subject));
        let uids = conn.search_folder_writable(INBOX, &query).await?;
        Ok(uids.into_iter().min())
    }
}

#[async_trait]
impl MailboxChecker for ImapChecker {
    async fn check(
        &self,
        address: &str,
        credential: &SecretString,
        message_id: Option<&str>,
        subject: Option<&str>,
    ) -> CheckOutcome {
        match self.try_check(address, credential, message_id, subject).await {
            Ok(outcome) => {
                match outcome.status {
                    DeliveryStatus::Inbox => info!("Email found in INBOX for {}", address),
                    DeliveryStatus::Spam => warn!(
                        "Email found in spam folder ({}) for {}",
                        outcome.folder.as_deref().unwrap_or("?"),
                        address
                    ),
                    _ => warn!("Email not found for {}", address),
                }
                outcome
            }
            Err(e) => {
                warn!("IMAP check failed for {}: {}", address, e);
                CheckOutcome::failed(e.to_string())
            }
        }
    }

    async fn mark_read(&self, address: &str, credential: &SecretString, subject: &str) -> bool {
        let result: error::Result<bool> = async {
            let mut conn = ImapConnection::connect(&self.endpoint, address, credential).await?;
            let marked = match self.first_inbox_match(&mut conn, subject).await? {
                Some(uid) => {
                    conn.mark_seen(uid).await?;
                    true
                }
                None => false,
            };
            conn.logout().await?;
            Ok(marked)
        }
        .await;

        match result {
            Ok(true) => {
                info!("Marked email as read for {}", address);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Failed to mark email as read for {}: {}", address, e);
                false
            }
        }
    }

    async fn move_to_folder(
        &self,
        address: &str,
        credential: &SecretString,
        target_folder: &str,
        subject: &str,
    ) -> bool {
        let result: error::Result<bool> = async {
            let mut conn = ImapConnection::connect(&self.endpoint, address, credential).await?;
            let moved = match self.first_inbox_match(&mut conn, subject).await? {
                Some(uid) => {
                    conn.move_message(uid, target_folder).await?;
                    true
                }
                None => false,
            };
            conn.logout().await?;
            Ok(moved)
        }
        .await;

        match result {
            Ok(true) => {
                info!("Moved email to {} for {}", target_folder, address);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Failed to move email for {}: {}", address, e);
                false
            }
        }
    }
}
