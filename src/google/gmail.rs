//! Gmail REST integration.
//!
//! Reads the aggregator's MFA verification email and sends alert mail.
//!
//! API docs: https://developers.google.com/gmail/api/reference/rest
//! Base URL: https://gmail.googleapis.com/gmail/v1/users/me

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info};

use super::credentials::{GoogleAuth, GMAIL_READONLY, GMAIL_SEND};
use crate::aggregator::login::VerificationCodeSource;

const BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const APP: &str = "mail";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    snippet: String,
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Outgoing mail.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GmailClient {
    http: Client,
    auth: GoogleAuth,
    verification_subject: String,
}

impl GmailClient {
    pub fn new(auth: GoogleAuth, verification_subject: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Gmail")?;

        Ok(Self {
            http,
            auth,
            verification_subject: verification_subject.into(),
        })
    }

    /// The code from the newest message matching the verification subject.
    pub async fn latest_verification_code(&self) -> Result<String> {
        let token = self.auth.access_token(APP, &[GMAIL_READONLY]).await?;

        let url = format!(
            "{BASE_URL}/messages?q={}",
            urlencoding::encode(&self.verification_subject)
        );
        debug!(subject = %self.verification_subject, "Searching mailbox");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .context("Gmail message list request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gmail message list failed {status}: {body}");
        }

        let list: MessageList = resp
            .json()
            .await
            .context("Failed to parse Gmail message list")?;
        let newest = list
            .messages
            .first()
            .context("No verification email found")?;

        let resp = self
            .http
            .get(format!("{BASE_URL}/messages/{}?format=raw", newest.id))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .context("Gmail message request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gmail message fetch failed {status}: {body}");
        }

        let message: RawMessage = resp
            .json()
            .await
            .context("Failed to parse Gmail message")?;

        extract_verification_code(&message.snippet)
            .with_context(|| format!("No verification code in snippet: {}", message.snippet))
    }
}

#[async_trait]
impl VerificationCodeSource for GmailClient {
    async fn latest_code(&self) -> Result<String> {
        self.latest_verification_code().await
    }
}

#[async_trait]
impl Mailer for GmailClient {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let token = self.auth.access_token(APP, &[GMAIL_SEND]).await?;
        let payload = serde_json::json!({ "raw": build_raw_message(to, subject, body) });

        let resp = self
            .http
            .post(format!("{BASE_URL}/messages/send"))
            .bearer_auth(token.expose_secret())
            .json(&payload)
            .send()
            .await
            .context("Gmail send request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Gmail send failed {status}: {body}");
        }

        info!(to, subject, "Email sent");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Snippets read like `"Your verification code: 123456 ..."`.
pub fn extract_verification_code(snippet: &str) -> Option<String> {
    let after = snippet.split(": ").nth(1)?;
    let code = after.split(' ').next()?.trim();
    (!code.is_empty()).then(|| code.to_string())
}

/// Plain-text message, base64url encoded for the `raw` field.
/// No `From` header: Gmail fills it in, and a mismatched one gets flagged.
pub fn build_raw_message(to: &str, subject: &str, body: &str) -> String {
    let message = format!(
        "Content-Type: text/plain; charset=\"utf-8\"\r\n\
         MIME-Version: 1.0\r\n\
         Content-Transfer-Encoding: 8bit\r\n\
         to: {to}\r\n\
         subject: {subject}\r\n\
         \r\n\
         {body}"
    );
    URL_SAFE.encode(message.as_bytes())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
