//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (passwords, sheet ids) are referenced by env-var name in the
//! config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub aggregator: AggregatorConfig,
    pub webdriver: WebDriverConfig,
    pub brokerage: BrokerageConfig,
    pub google: GoogleConfig,
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregatorConfig {
    /// Public landing page with the "Log In" link.
    pub home_url: String,
    /// Root of the authenticated web app and its JSON services.
    pub root_url: String,
    /// Sign-in is complete once the browser URL starts with this.
    pub overview_url_prefix: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// How long to wait for the MFA email to arrive before reading it.
    #[serde(default = "default_email_wait_secs")]
    pub email_wait_secs: u64,
    /// Unbounded when absent.
    #[serde(default)]
    pub max_login_polls: Option<u32>,
    /// Where unexpected login pages are dumped.
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebDriverConfig {
    pub url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrokerageConfig {
    /// Findata label the portfolio value is stored under.
    pub label: String,
    pub api_url: String,
    pub username_env: String,
    pub password_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    pub credentials_dir: PathBuf,
    /// Subject filter used to find the MFA verification email.
    pub verification_subject: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    pub spreadsheet_id_env: String,
    pub finances_sheet: String,
    /// Column span read to find the last written row, e.g. `A:N`.
    pub finances_span: String,
    pub expenses_sheet: String,
    /// Columns written after the date cell, in order.
    pub columns: Vec<ColumnSpec>,
}

/// One finances-sheet column after the date.
///
/// A string names a findata label (an empty string leaves the cell blank);
/// a number is written as-is.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum ColumnSpec {
    Literal(f64),
    Label(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    /// Env var holding the address that receives degraded-run alerts.
    pub email_to_env: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_email_wait_secs() -> u64 {
    60
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from("html")
}

fn default_true() -> bool {
    true
}

impl AggregatorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn email_wait(&self) -> Duration {
        Duration::from_secs(self.email_wait_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
pub(crate) const SAMPLE: &str = r#"
[aggregator]
home_url = "https://www.mint.com"
root_url = "https://mint.intuit.com"
overview_url_prefix = "https://mint.intuit.com/overview.event"

[webdriver]
url = "http://localhost:9515"

[brokerage]
label = "Robinhood"
api_url = "https://api.robinhood.com"
username_env = "ROBINHOOD_USER"
password_env = "ROBINHOOD_PASS"

[google]
credentials_dir = "creds"
verification_subject = "Verify your Mint account"

[sheets]
spreadsheet_id_env = "MASTER_SHEET_ID"
finances_sheet = "Finances"
finances_span = "A:N"
expenses_sheet = "Expenses"
columns = ["Chase: Checking", "", "Robinhood", 0]
"#;
