//! Email content generation.
//!
//! Calls a chat-completions text-generation API with category-specific
//! instructions and parses the strict two-field reply. Any API or parse
//! failure falls back to a static template table, so generation itself
//! never fails.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ContentCategory;

/// Internal generation failures; all of them trigger the template fallback.
#[derive(Error, Debug)]
enum ContentError {
    #[error("Text-generation API error: {0}")]
    Api(String),

    #[error("Failed to parse generated content: {0}")]
    Parse(String),
}

/// A generated subject and body pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailContent {
    pub subject: String,
    pub body: String,
}

/// Produces a subject/body pair for a requested category.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, category: ContentCategory) -> EmailContent;
}

/// Default connect timeout for HTTP requests (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default request timeout for HTTP requests (30 seconds).
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TRANSACTIONAL_PROMPT: &str = "Generate a professional transactional email.\n\
Examples: order confirmation, password reset, account verification, shipping notification.\n\
Keep it concise (2-3 sentences) and professional.\n\
Return ONLY in this format:\n\
SUBJECT: [subject line]\n\
BODY: [email body]";

const NEWSLETTER_PROMPT: &str = "Generate a friendly newsletter-style email.\n\
Topics: product updates, tips, community news, feature announcements.\n\
Keep it engaging but brief (3-4 sentences).\n\
Return ONLY in this format:\n\
SUBJECT: [subject line]\n\
BODY: [email body]";

const PERSONAL_PROMPT: &str = "Generate a casual, personal email.\n\
Topics: quick questions, follow-ups, thank you notes, friendly check-ins.\n\
Keep it warm and conversational (2-3 sentences).\n\
Return ONLY in this format:\n\
SUBJECT: [subject line]\n\
BODY: [email body]";

fn prompt_for(category: ContentCategory) -> &'static str {
    match category {
        ContentCategory::Transactional => TRANSACTIONAL_PROMPT,
        ContentCategory::Newsletter => NEWSLETTER_PROMPT,
        // Mixed is resolved before prompting; personal is the safe default.
        ContentCategory::Personal | ContentCategory::Mixed => PERSONAL_PROMPT,
    }
}

/// Canned content used when the API is unavailable or returns something
/// unparseable.
const TRANSACTIONAL_TEMPLATES: [(&str, &str); 3] = [
    (
        "Order Confirmation",
        "Your order has been confirmed and will be shipped soon.",
    ),
    (
        "Password Reset",
        "We received a request to reset your password.",
    ),
    (
        "Account Verification",
        "Please verify your email address to complete registration.",
    ),
];

const NEWSLETTER_TEMPLATES: [(&str, &str); 3] = [
    (
        "Monthly Update",
        "Here's what's new this month with our service.",
    ),
    (
        "Tips and Tricks",
        "Discover new ways to get the most out of our platform.",
    ),
    (
        "Community Highlights",
        "See what our community has been up to this week.",
    ),
];

const PERSONAL_TEMPLATES: [(&str, &str); 3] = [
    (
        "Quick Question",
        "I hope this email finds you well. I wanted to reach out about...",
    ),
    (
        "Following Up",
        "Just wanted to follow up on our previous conversation.",
    ),
    (
        "Thank You",
        "I wanted to take a moment to thank you for your help.",
    ),
];

fn templates_for(category: ContentCategory) -> &'static [(&'static str, &'static str)] {
    match category {
        ContentCategory::Transactional => &TRANSACTIONAL_TEMPLATES,
        ContentCategory::Newsletter => &NEWSLETTER_TEMPLATES,
        ContentCategory::Personal | ContentCategory::Mixed => &PERSONAL_TEMPLATES,
    }
}

/// Extracts the `SUBJECT:` and `BODY:` fields by fixed-prefix matching.
fn parse_subject_body(content: &str) -> Result<EmailContent, ContentError> {
    let mut subject = String::new();
    let mut body = String::new();

    for line in content.lines() {
        if let Some(rest) = line.strip_prefix("SUBJECT:") {
            subject = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix("BODY:") {
            body = rest.trim().to_string();
        }
    }

    if subject.is_empty() || body.is_empty() {
        return Err(ContentError::Parse(format!(
            "missing SUBJECT or BODY field in: {:.80}",
            content
        )));
    }

    Ok(EmailContent { subject, body })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

/// Generator backed by a chat-completions API, with template fallback.
pub struct ApiContentGenerator {
    client: Option<Client>,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    rng: Mutex<StdRng>,
}

impl ApiContentGenerator {
    /// Creates a generator. With no API key it runs in permanent fallback
    /// mode and never issues requests.
    pub fn new(base_url: &str, model: &str, api_key: Option<SecretString>, rng: StdRng) -> Self {
        let client = if api_key.is_some() {
            match Client::builder()
                .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
                .timeout(DEFAULT_REQUEST_TIMEOUT)
                .build()
            {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Failed to create HTTP client, using fallback templates: {}", e);
                    None
                }
            }
        } else {
            debug!("No text-generation API key configured, using fallback templates");
            None
        };

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
            rng: Mutex::new(rng),
        }
    }

    /// Resolves `Mixed` to a uniformly random concrete category.
    fn resolve(&self, category: ContentCategory) -> ContentCategory {
        if category != ContentCategory::Mixed {
            return category;
        }
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        ContentCategory::CONCRETE[rng.gen_range(0..ContentCategory::CONCRETE.len())]
    }

    fn fallback(&self, category: ContentCategory) -> EmailContent {
        let templates = templates_for(category);
        let mut rng = match self.rng.lock() {
            Ok(rng) => rng,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (subject, body) = templates
            .choose(&mut *rng)
            .copied()
            .unwrap_or(("Quick Question", "Just checking in."));
        EmailContent {
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    async fn try_generate(&self, category: ContentCategory) -> Result<EmailContent, ContentError> {
        let (client, api_key) = match (&self.client, &self.api_key) {
            (Some(client), Some(api_key)) => (client, api_key),
            _ => return Err(ContentError::Api("no API key configured".to_string())),
        };

        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: "You are a helpful assistant that generates realistic email content.",
                },
                ChatMessage {
                    role: "user",
                    content: prompt_for(category),
                },
            ],
            max_tokens: 200,
            temperature: 0.9,
        };

        let response = client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ContentError::Api(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ContentError::Api(format!(
                "HTTP {} from text-generation API",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ContentError::Api(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ContentError::Api("response contained no choices".to_string()))?;

        parse_subject_body(&content)
    }
}

#[async_trait]
impl ContentGenerator for ApiContentGenerator {
    async fn generate(&self, category: ContentCategory) -> EmailContent {
        let category = self.resolve(category);

        match self.try_generate(category).await {
            Ok(content) => {
                debug!(
                    "Generated {} email via API: {}",
                    category.as_str(),
                    content.subject
                );
                content
            }
            Err(e) => {
                warn!("Content generation failed, using fallback: {}", e);
                self.fallback(category)
            }
        }
    }
}
