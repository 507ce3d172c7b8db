use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailrampError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] crate::mailbox::MailboxError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),
}

pub type Result<T> = std::result::Result<T, MailrampError>;
