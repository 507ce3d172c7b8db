//! Shared fixtures for integration tests: an in-memory database with
//! seeded identities and stub collaborators standing in for the sending
//! provider, the mailbox protocol and the text-generation API.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use secrecy::SecretString;

use mailramp::db::{identity_repo, Database};
use mailramp::{
    CheckOutcome, ContentCategory, ContentGenerator, CredentialCipher, DeliveryStatus,
    EmailContent, MailSender, MailboxChecker, MailboxRole, SendOutcome, WarmupEngine,
    WarmupSettings,
};

pub const TEST_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

pub const SENDER_POOL: [&str; 2] = ["alpha@senders.example", "beta@senders.example"];
pub const RECIPIENT_WITH_CREDENTIAL: &str = "warm@recipients.example";
pub const RECIPIENT_WITHOUT_CREDENTIAL: &str = "cold@recipients.example";

/// Provider stub: every send succeeds with a unique message id unless
/// `fail_all` is set.
#[derive(Default)]
pub struct RecordingSender {
    pub calls: AtomicU32,
    pub fail_all: bool,
}

#[async_trait]
impl MailSender for RecordingSender {
    async fn send(&self, _: &str, _: &str, _: &str, _: &str) -> SendOutcome {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all {
            SendOutcome {
                success: false,
                provider_message_id: None,
                error: Some("stubbed failure".to_string()),
            }
        } else {
            SendOutcome {
                success: true,
                provider_message_id: Some(format!("it-msg-{}", n)),
                error: None,
            }
        }
    }
}

/// Mailbox stub returning a fixed placement.
pub struct FixedChecker {
    pub status: DeliveryStatus,
    pub check_calls: AtomicU32,
}

impl FixedChecker {
    pub fn new(status: DeliveryStatus) -> Self {
        Self {
            status,
            check_calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl MailboxChecker for FixedChecker {
    async fn check(
        &self,
        _: &str,
        _: &SecretString,
        _: Option<&str>,
        _: Option<&str>,
    ) -> CheckOutcome {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        CheckOutcome {
            found: matches!(self.status, DeliveryStatus::Inbox | DeliveryStatus::Spam),
            status: self.status,
            folder: match self.status {
                DeliveryStatus::Inbox => Some("INBOX".to_string()),
                DeliveryStatus::Spam => Some("Junk".to_string()),
                _ => None,
            },
            error: None,
        }
    }

    async fn mark_read(&self, _: &str, _: &SecretString, _: &str) -> bool {
        true
    }

    async fn move_to_folder(&self, _: &str, _: &SecretString, _: &str, _: &str) -> bool {
        true
    }
}

/// Canned content, one subject per category.
pub struct CannedGenerator {
    pub calls: Mutex<Vec<ContentCategory>>,
}

impl Default for CannedGenerator {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ContentGenerator for CannedGenerator {
    async fn generate(&self, category: ContentCategory) -> EmailContent {
        self.calls.lock().unwrap().push(category);
        EmailContent {
            subject: format!("Canned {}", category.as_str()),
            body: "Canned body for integration tests.".to_string(),
        }
    }
}

pub struct Harness {
    pub db: Database,
    pub sender: Arc<RecordingSender>,
    pub checker: Arc<FixedChecker>,
    pub generator: Arc<CannedGenerator>,
    pub engine: WarmupEngine,
}

/// Builds an engine over an in-memory database with one credentialed and
/// one credential-less recipient, zero pacing delays and a seeded rng.
pub fn harness(status: DeliveryStatus) -> Harness {
    harness_with(status, false)
}

/// Same harness but the provider stub rejects every send.
pub fn failing_harness() -> Harness {
    harness_with(DeliveryStatus::Inbox, true)
}

fn harness_with(status: DeliveryStatus, fail_all: bool) -> Harness {
    let db = Database::open_in_memory().expect("in-memory database");
    let cipher = CredentialCipher::from_hex_key(TEST_KEY).expect("test cipher");

    let encrypted = cipher.encrypt("imap-secret").expect("encrypt");
    identity_repo::insert(
        &db,
        RECIPIENT_WITH_CREDENTIAL,
        MailboxRole::Recipient,
        Some(&encrypted),
    )
    .expect("seed recipient");
    identity_repo::insert(&db, RECIPIENT_WITHOUT_CREDENTIAL, MailboxRole::Recipient, None)
        .expect("seed recipient");
    for sender in SENDER_POOL {
        identity_repo::insert(&db, sender, MailboxRole::Sender, None).expect("seed sender");
    }

    let settings = WarmupSettings {
        sender_addresses: SENDER_POOL.iter().map(|s| s.to_string()).collect(),
        recipient_addresses: vec![RECIPIENT_WITH_CREDENTIAL.to_string()],
        min_send_delay_secs: 0,
        max_send_delay_secs: 0,
        check_delay_minutes: 0,
    };

    let sender = Arc::new(RecordingSender {
        fail_all,
        ..Default::default()
    });
    let checker = Arc::new(FixedChecker::new(status));
    let generator = Arc::new(CannedGenerator::default());

    let engine = WarmupEngine::new(
        db.clone(),
        settings,
        sender.clone(),
        checker.clone(),
        generator.clone(),
        Some(cipher),
        StdRng::seed_from_u64(1234),
    );

    Harness {
        db,
        sender,
        checker,
        generator,
        engine,
    }
}
