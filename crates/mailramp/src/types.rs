//! Domain enums shared across the crate.
//!
//! All enums serialize as lowercase strings, which is also the form they
//! take in the database.

use serde::{Deserialize, Serialize};

/// Category of generated email content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Transactional,
    Newsletter,
    Personal,
    /// Resolved to a random concrete category at generation time.
    Mixed,
}

impl ContentCategory {
    /// All categories a batch may pick from, including `Mixed`.
    pub const ALL: [ContentCategory; 4] = [
        ContentCategory::Transactional,
        ContentCategory::Newsletter,
        ContentCategory::Personal,
        ContentCategory::Mixed,
    ];

    /// The concrete categories `Mixed` resolves to.
    pub const CONCRETE: [ContentCategory; 3] = [
        ContentCategory::Transactional,
        ContentCategory::Newsletter,
        ContentCategory::Personal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Transactional => "transactional",
            ContentCategory::Newsletter => "newsletter",
            ContentCategory::Personal => "personal",
            ContentCategory::Mixed => "mixed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transactional" => Some(ContentCategory::Transactional),
            "newsletter" => Some(ContentCategory::Newsletter),
            "personal" => Some(ContentCategory::Personal),
            "mixed" => Some(ContentCategory::Mixed),
            _ => None,
        }
    }
}

/// Outcome of the submission to the sending provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Failed,
    Bounced,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
            SendStatus::Bounced => "bounced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(SendStatus::Sent),
            "failed" => Some(SendStatus::Failed),
            "bounced" => Some(SendStatus::Bounced),
            _ => None,
        }
    }
}

/// Where a sent message was found to have landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Not yet checked.
    Pending,
    Inbox,
    Spam,
    /// Checked but not found, or no credential to check with.
    Unknown,
    /// The check itself failed (connection, auth).
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Inbox => "inbox",
            DeliveryStatus::Spam => "spam",
            DeliveryStatus::Unknown => "unknown",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeliveryStatus::Pending),
            "inbox" => Some(DeliveryStatus::Inbox),
            "spam" => Some(DeliveryStatus::Spam),
            "unknown" => Some(DeliveryStatus::Unknown),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }
}

/// Role of a configured mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxRole {
    Sender,
    Recipient,
}

impl MailboxRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailboxRole::Sender => "sender",
            MailboxRole::Recipient => "recipient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sender" => Some(MailboxRole::Sender),
            "recipient" => Some(MailboxRole::Recipient),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_roundtrip() {
        for cat in ContentCategory::ALL {
            assert_eq!(ContentCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(ContentCategory::parse("bogus"), None);
    }

    #[test]
    fn test_concrete_excludes_mixed() {
        assert!(!ContentCategory::CONCRETE.contains(&ContentCategory::Mixed));
    }

    #[test]
    fn test_delivery_status_roundtrip() {
        for s in [
            DeliveryStatus::Pending,
            DeliveryStatus::Inbox,
            DeliveryStatus::Spam,
            DeliveryStatus::Unknown,
            DeliveryStatus::Failed,
        ] {
            assert_eq!(DeliveryStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&DeliveryStatus::Inbox).unwrap();
        assert_eq!(json, "\"inbox\"");
        let json = serde_json::to_string(&MailboxRole::Recipient).unwrap();
        assert_eq!(json, "\"recipient\"");
    }
}
