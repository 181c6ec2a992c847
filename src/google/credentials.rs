//! Stored Google OAuth credentials.
//!
//! Credentials live at `<dir>/<app>/<app>.<scopes>.credentials.json`, one
//! file per app and scope set, where `<scopes>` is the last path segment of
//! each scope URL joined by `-`. The file is produced by the one-time
//! consent flow; here we only refresh the access token and write it back.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::TrackerError;

pub const GMAIL_READONLY: &str = "https://www.googleapis.com/auth/gmail.readonly";
pub const GMAIL_SEND: &str = "https://www.googleapis.com/auth/gmail.send";
pub const SPREADSHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the recorded expiry.
const EXPIRY_SLACK_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// Storage format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_expiry: Option<DateTime<Utc>>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    /// Anything else the consent flow wrote; preserved on rewrite.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl StoredCredentials {
    /// Whether the access token is missing or about to expire.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.token_expiry) {
            (Some(_), Some(expiry)) => expiry <= now + ChronoDuration::seconds(EXPIRY_SLACK_SECS),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `gmail.readonly` for `[GMAIL_READONLY]`, joined by `-` for several.
pub fn abbreviate_scopes(scopes: &[&str]) -> String {
    scopes
        .iter()
        .map(|s| s.rsplit('/').next().unwrap_or(s))
        .collect::<Vec<_>>()
        .join("-")
}

pub fn credentials_path(dir: &Path, app: &str, scopes: &[&str]) -> PathBuf {
    dir.join(app)
        .join(format!("{app}.{}.credentials.json", abbreviate_scopes(scopes)))
}

// ---------------------------------------------------------------------------
// Token provider
// ---------------------------------------------------------------------------

/// Hands out access tokens from the on-disk credential store.
#[derive(Clone)]
pub struct GoogleAuth {
    http: Client,
    dir: PathBuf,
}

impl GoogleAuth {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Google OAuth")?;

        Ok(Self {
            http,
            dir: dir.into(),
        })
    }

    /// A valid access token for `app` with the given scopes.
    pub async fn access_token(&self, app: &str, scopes: &[&str]) -> Result<SecretString> {
        let path = credentials_path(&self.dir, app, scopes);
        debug!(app, scopes = %abbreviate_scopes(scopes), "Pulling credentials");

        let mut creds = load(&path).await?;
        if creds.needs_refresh(Utc::now()) {
            self.refresh(&mut creds).await?;
            save(&path, &creds).await?;
            info!(path = %path.display(), "Stored refreshed credentials");
        }

        let token = creds
            .access_token
            .context("Credentials have no access token after refresh")?;
        Ok(SecretString::new(token))
    }

    async fn refresh(&self, creds: &mut StoredCredentials) -> Result<()> {
        debug!("Refreshing Google access token");
        let resp = self
            .http
            .post(&creds.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Google token refresh request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Google token refresh failed {status}: {body}");
        }

        let token: TokenResponse = resp
            .json()
            .await
            .context("Failed to parse Google token response")?;

        creds.access_token = Some(token.access_token);
        creds.token_expiry = token
            .expires_in
            .map(|secs| Utc::now() + ChronoDuration::seconds(secs));
        Ok(())
    }
}

async fn load(path: &Path) -> Result<StoredCredentials> {
    if !path.exists() {
        return Err(TrackerError::MissingCredentials(path.display().to_string()).into());
    }
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read credentials from {}", path.display()))?;
    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse credentials from {}", path.display()))
}

async fn save(path: &Path, creds: &StoredCredentials) -> Result<()> {
    let json = serde_json::to_string_pretty(creds).context("Failed to serialise credentials")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write credentials to {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
