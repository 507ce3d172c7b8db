pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod mailbox;
pub mod provider;
pub mod secrets;
pub mod types;
pub mod warmup;

pub use config::{Config, ConfigError, RunEnv};
pub use content::{ApiContentGenerator, ContentGenerator, EmailContent};
pub use error::{MailrampError, Result};
pub use mailbox::{CheckOutcome, ImapChecker, MailboxChecker, MailboxEndpoint};
pub use provider::{HttpMailSender, MailSender, SendOutcome};
pub use secrets::{resolve_env_secret, resolve_env_secret_optional, CredentialCipher, SecretError};
pub use types::{ContentCategory, DeliveryStatus, MailboxRole, SendStatus};
pub use warmup::scheduler::{JobStatus, Trigger, WarmupScheduler};
pub use warmup::{
    BatchOutcome, CheckReport, ManualSendOutcome, SkipReason, WarmupEngine, WarmupProgress,
    WarmupSettings,
};
