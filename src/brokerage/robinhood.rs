//! Robinhood integration.
//!
//! Logs in with the OAuth password grant and reads the account's portfolio
//! equity. Only the first portfolio is considered.
//!
//! Base URL: https://api.robinhood.com
//! Auth: `Authorization: Bearer {access_token}` from `/oauth2/token/`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::Brokerage;
use crate::types::{PortfolioValue, TrackerError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Public client id of Robinhood's own web app.
const CLIENT_ID: &str = "c82SH0WZOsabOXGP2sxqcj34FxkvfnWRZBKlBjFS";
const TOKEN_EXPIRY_SECS: u32 = 86_400;
const NAME: &str = "robinhood";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortfolioPage {
    #[serde(default)]
    results: Vec<Portfolio>,
}

/// Equity values arrive as decimal strings; the extended-hours value is
/// null or empty outside trading days.
#[derive(Debug, Deserialize)]
struct Portfolio {
    #[serde(default)]
    equity: Option<String>,
    #[serde(default)]
    extended_hours_equity: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct RobinhoodClient {
    http: Client,
    api_url: String,
    username: String,
    password: SecretString,
}

impl RobinhoodClient {
    pub fn new(api_url: &str, username: String, password: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Robinhood")?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            username,
            password,
        })
    }

    /// Access token, or `None` when the credentials are rejected.
    async fn login(&self) -> Result<Option<SecretString>> {
        let body = serde_json::json!({
            "username": self.username,
            "password": self.password.expose_secret(),
            "grant_type": "password",
            "client_id": CLIENT_ID,
            "scope": "internal",
            "expires_in": TOKEN_EXPIRY_SECS,
            "device_token": uuid::Uuid::new_v4().to_string(),
        });

        let resp = self
            .http
            .post(format!("{}/oauth2/token/", self.api_url))
            .json(&body)
            .send()
            .await
            .context("Robinhood login request failed")?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        token_outcome(status, &body)
    }

    async fn first_portfolio(&self, token: &SecretString) -> Result<Portfolio> {
        let resp = self
            .http
            .get(format!("{}/portfolios/", self.api_url))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .context("Robinhood portfolio request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Robinhood portfolio fetch failed {status}: {body}");
        }

        let page: PortfolioPage = resp
            .json()
            .await
            .context("Failed to parse Robinhood portfolios")?;
        page.results
            .into_iter()
            .next()
            .context("Robinhood account has no portfolio")
    }
}

#[async_trait]
impl Brokerage for RobinhoodClient {
    async fn portfolio_value(&self) -> Result<PortfolioValue> {
        info!("Fetching Robinhood portfolio value");
        let Some(token) = self.login().await? else {
            return Ok(PortfolioValue::BadLogin);
        };
        debug!("Robinhood login succeeded");

        let portfolio = self.first_portfolio(&token).await?;
        let equity = select_equity(&portfolio)?;
        info!(equity = %equity, "Robinhood portfolio value");
        Ok(PortfolioValue::Equity(equity))
    }

    fn name(&self) -> &str {
        NAME
    }
}

/// Access token from a login response. A rejected status, or a success
/// body without a token (e.g. an MFA demand), is `None`.
fn token_outcome(status: StatusCode, body: &str) -> Result<Option<SecretString>> {
    if !status.is_success() {
        warn!(status = %status, body = %body, "Robinhood rejected login");
        return Ok(None);
    }

    let token: TokenResponse =
        serde_json::from_str(body).context("Failed to parse Robinhood token response")?;
    if token.access_token.is_none() {
        warn!(body = %body, "Robinhood login returned no access token");
    }
    Ok(token.access_token.map(SecretString::new))
}

/// Extended-hours equity when set, else regular equity.
fn select_equity(portfolio: &Portfolio) -> Result<Decimal, TrackerError> {
    let raw = portfolio
        .extended_hours_equity
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or(portfolio.equity.as_deref())
        .ok_or_else(|| TrackerError::InvalidAmount("portfolio has no equity".into()))?;

    Decimal::from_str(raw.trim()).map_err(|e| TrackerError::InvalidAmount(format!("{raw}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
