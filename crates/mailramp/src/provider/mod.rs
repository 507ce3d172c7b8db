//! Sending-provider client: submits messages to the transactional-email
//! HTTP API and normalizes the response.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing or configuring the provider client. Per-message
/// send failures are not errors; they are encoded in [`SendOutcome`].
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Failed to create HTTP client: {0}")]
    BuildClient(String),

    #[error("Provider API key not configured")]
    MissingApiKey,
}

/// Result of a single send attempt. One attempt per call; retry policy,
/// if wanted, belongs to the caller.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

impl SendOutcome {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Submits a single message to the sending provider.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, sender: &str, recipient: &str, subject: &str, body: &str)
        -> SendOutcome;
}

/// API key header used by the provider.
const API_KEY_HEADER: &str = "X-Server-API-Key";

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for HTTP requests (30 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct SendRequest<'a> {
    to: [&'a str; 1],
    from: &'a str,
    subject: &'a str,
    plain_body: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    data: Option<ProviderData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderData {
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP client for the provider's message-submission endpoint.
pub struct HttpMailSender {
    client: Client,
    send_url: String,
    base_url: String,
    api_key: SecretString,
}

impl HttpMailSender {
    /// Creates a sender for the given provider base URL.
    pub fn new(base_url: &str, api_key: SecretString) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::BuildClient(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            send_url: format!("{}/api/v1/send/message", base_url),
            base_url,
            client,
            api_key,
        })
    }

    /// Probes the provider API with a harmless query so misconfiguration
    /// surfaces at startup instead of on the first batch. Best-effort.
    pub async fn validate_connection(&self) -> bool {
        let url = format!("{}/api/v1/messages/deliveries", self.base_url);
        let result = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .query(&[("id", "probe")])
            .send()
            .await;

        match result {
            Ok(response) if response.status().as_u16() == 200 => {
                info!("Provider API connection validated");
                true
            }
            Ok(response) if response.status().as_u16() == 401 => {
                error!("Provider API authentication failed - invalid API key");
                false
            }
            Ok(response) => {
                warn!("Provider API returned status {}", response.status());
                false
            }
            Err(e) => {
                error!("Failed to reach provider API: {}", e);
                false
            }
        }
    }
}

/// Maps HTTP status plus the provider's response body to an outcome.
/// HTTP 200 with a provider-level `success` status is the only success.
fn interpret(http_status: u16, body: ProviderResponse) -> SendOutcome {
    if http_status == 200 && body.status.as_deref() == Some("success") {
        return SendOutcome {
            success: true,
            provider_message_id: body.data.and_then(|d| d.message_id),
            error: None,
        };
    }

    let detail = body
        .data
        .and_then(|d| d.message)
        .or(body.status)
        .unwrap_or_else(|| "unknown error".to_string());
    SendOutcome::failure(format!("Provider rejected message (HTTP {}): {}", http_status, detail))
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(
        &self,
        sender: &str,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> SendOutcome {
        debug!("Sending email from {} to {}: {}", sender, recipient, subject);

        let payload = SendRequest {
            to: [recipient],
            from: sender,
            subject,
            plain_body: body,
        };

        let response = match self
            .client
            .post(&self.send_url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                error!("Provider API request timed out");
                return SendOutcome::failure("Request timed out");
            }
            Err(e) => {
                error!("Provider API request failed: {}", e);
                return SendOutcome::failure(format!("Request failed: {}", e));
            }
        };

        let http_status = response.status().as_u16();
        let parsed: ProviderResponse = match response.json().await {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("Invalid provider response: {}", e);
                return SendOutcome::failure(format!("Invalid provider response: {}", e));
            }
        };

        let outcome = interpret(http_status, parsed);
        match &outcome.provider_message_id {
            Some(id) if outcome.success => info!("Email sent, provider message id {}", id),
            _ if outcome.success => info!("Email sent (no provider message id returned)"),
            _ => error!(
                "Failed to send email: {}",
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> ProviderResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_interpret_success() {
        let body = parse(r#"{"status":"success","data":{"message_id":"abc-123"}}"#);
        let outcome = interpret(200, body);
        assert!(outcome.success);
        assert_eq!(outcome.provider_message_id.as_deref(), Some("abc-123"));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_interpret_semantic_failure() {
        let body = parse(r#"{"status":"error","data":{"message":"invalid from address"}}"#);
        let outcome = interpret(200, body);
        assert!(!outcome.success);
        assert!(outcome.provider_message_id.is_none());
        assert!(outcome.error.unwrap().contains("invalid from address"));
    }

    #[test]
    fn test_interpret_http_error() {
        let body = parse(r#"{"status":"success"}"#);
        let outcome = interpret(500, body);
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("HTTP 500"));
    }

    #[test]
    fn test_interpret_empty_body() {
        let outcome = interpret(200, ProviderResponse::default());
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unknown error"));
    }

    #[test]
    fn test_sender_construction() {
        let sender =
            HttpMailSender::new("https://postal.example.com/", SecretString::from("key"))
                .unwrap();
        assert_eq!(
            sender.send_url,
            "https://postal.example.com/api/v1/send/message"
        );
    }

    #[test]
    fn test_request_serialization() {
        let payload = SendRequest {
            to: ["r@x.com"],
            from: "s@x.com",
            subject: "Hello",
            plain_body: "World",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["to"][0], "r@x.com");
        assert_eq!(json["from"], "s@x.com");
        assert_eq!(json["plain_body"], "World");
    }
}
