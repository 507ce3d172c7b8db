//! Environment-sourced configuration.
//!
//! Values are read through an injectable lookup function so tests can feed
//! a plain map instead of mutating process environment. `validate` reports
//! every problem at once; the daemon decides whether problems are fatal
//! based on the deployment environment.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveTime;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: String, reason: String },

    #[error("Failed to read secret file '{path}': {source}")]
    SecretFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Deployment environment, from `MAILRAMP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEnv {
    Development,
    Production,
}

/// Full configuration surface.
pub struct Config {
    pub env: RunEnv,

    /// Database file path; `None` means the per-user default location.
    pub database_path: Option<PathBuf>,

    // Sending provider
    pub provider_base_url: String,
    pub provider_api_key: Option<SecretString>,

    // Text-generation API
    pub textgen_base_url: String,
    pub textgen_model: String,
    pub textgen_api_key: Option<SecretString>,

    // Mailbox inspection
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_use_tls: bool,

    // Address pools
    pub sender_addresses: Vec<String>,
    pub recipient_addresses: Vec<String>,
    /// Per-recipient IMAP credentials, from `email:secret,email:secret`.
    pub recipient_credentials: HashMap<String, SecretString>,

    // Warmup pacing
    pub daily_send_time: NaiveTime,
    pub min_send_delay_secs: u64,
    pub max_send_delay_secs: u64,
    pub check_delay_minutes: i64,
}

impl Config {
    /// Loads configuration from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary lookup function.
    pub fn from_vars<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match get("MAILRAMP_ENV").as_deref() {
            Some("production") => RunEnv::Production,
            _ => RunEnv::Development,
        };

        let database_path = get("MAILRAMP_DATABASE_PATH").map(PathBuf::from);

        let provider_base_url = get("PROVIDER_BASE_URL")
            .unwrap_or_default()
            .trim_end_matches('/')
            .to_string();
        let provider_api_key = lookup_secret(&get, "PROVIDER_API_KEY")?;

        let textgen_base_url = get("TEXTGEN_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com".to_string())
            .trim_end_matches('/')
            .to_string();
        let textgen_model = get("TEXTGEN_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let textgen_api_key = lookup_secret(&get, "TEXTGEN_API_KEY")?;

        let imap_host = get("IMAP_HOST").unwrap_or_default();
        let imap_port = parse_number(&get, "IMAP_PORT", 993u16)?;
        let imap_use_tls = parse_bool(&get, "IMAP_USE_TLS", true)?;

        let sender_addresses = parse_address_list(get("SENDER_ADDRESSES").as_deref());
        let recipient_addresses = parse_address_list(get("RECIPIENT_ADDRESSES").as_deref());
        let recipient_credentials =
            parse_credential_map(get("RECIPIENT_IMAP_CREDENTIALS").as_deref());

        let daily_send_time = match get("DAILY_SEND_TIME") {
            Some(raw) => {
                NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| ConfigError::Invalid {
                    name: "DAILY_SEND_TIME".to_string(),
                    reason: format!("expected HH:MM, got '{}': {}", raw, e),
                })?
            }
            None => NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
        };

        let min_send_delay_secs = parse_number(&get, "MIN_SEND_DELAY_SECS", 2u64)?;
        let max_send_delay_secs = parse_number(&get, "MAX_SEND_DELAY_SECS", 5u64)?;
        if min_send_delay_secs > max_send_delay_secs {
            return Err(ConfigError::Invalid {
                name: "MIN_SEND_DELAY_SECS".to_string(),
                reason: format!(
                    "minimum delay {} exceeds maximum delay {}",
                    min_send_delay_secs, max_send_delay_secs
                ),
            });
        }

        let check_delay_minutes = parse_number(&get, "CHECK_DELAY_MINUTES", 15i64)?;

        Ok(Self {
            env,
            database_path,
            provider_base_url,
            provider_api_key,
            textgen_base_url,
            textgen_model,
            textgen_api_key,
            imap_host,
            imap_port,
            imap_use_tls,
            sender_addresses,
            recipient_addresses,
            recipient_credentials,
            daily_send_time,
            min_send_delay_secs,
            max_send_delay_secs,
            check_delay_minutes,
        })
    }

    /// Returns every configuration problem that would prevent warmup from
    /// running. Empty means the configuration is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.provider_base_url.is_empty() {
            problems.push("PROVIDER_BASE_URL is required".to_string());
        }
        if self.provider_api_key.is_none() {
            problems.push("PROVIDER_API_KEY is required".to_string());
        }
        if self.sender_addresses.is_empty() {
            problems.push("At least one SENDER_ADDRESSES entry is required".to_string());
        }
        if self.recipient_addresses.is_empty() {
            problems.push("At least one RECIPIENT_ADDRESSES entry is required".to_string());
        }
        if self.imap_host.is_empty() {
            problems.push("IMAP_HOST is required for delivery checking".to_string());
        }

        problems
    }
}

fn lookup_secret<F>(get: &F, name: &str) -> Result<Option<SecretString>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = get(name) {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Ok(Some(SecretString::from(trimmed)));
        }
    }

    if let Some(path) = get(&format!("{}_FILE", name)) {
        if !path.is_empty() {
            return match std::fs::read_to_string(&path) {
                Ok(content) => Ok(Some(SecretString::from(content.trim().to_string()))),
                Err(e) => Err(ConfigError::SecretFile { path, source: e }),
            };
        }
    }

    Ok(None)
}

fn parse_number<F, T>(get: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) => raw.trim().parse().map_err(|e| ConfigError::Invalid {
            name: name.to_string(),
            reason: format!("'{}': {}", raw, e),
        }),
        None => Ok(default),
    }
}

fn parse_bool<F>(get: &F, name: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::Invalid {
                name: name.to_string(),
                reason: format!("expected boolean, got '{}'", other),
            }),
        },
        None => Ok(default),
    }
}

/// Splits a comma-separated address list, dropping empty entries.
fn parse_address_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses `email:secret,email:secret` into a credential map. Secrets may
/// contain `:`; only the first separator splits.
fn parse_credential_map(raw: Option<&str>) -> HashMap<String, SecretString> {
    let mut map = HashMap::new();
    for item in raw.unwrap_or_default().split(',') {
        if let Some((email, secret)) = item.split_once(':') {
            let email = email.trim();
            let secret = secret.trim();
            if !email.is_empty() && !secret.is_empty() {
                map.insert(email.to_string(), SecretString::from(secret));
            }
        }
    }
    map
}
