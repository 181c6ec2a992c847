//! Mint aggregator client.
//!
//! Signs in through the browser, then talks to Mint's web JSON services
//! with the session cookies and the API token embedded in the overview
//! page.
//!
//! Services used:
//! - `bundledServiceController.xevent` — accounts, categories, user properties
//! - `getJsonData.xevent` — paged transaction feed
//! - `refreshFILogins.xevent` — ask Mint to re-poll institutions

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::cookie::Jar;
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::login::{self, Credentials, LoginSettings, VerificationCodeSource};
use super::shaping;
use super::{Aggregator, TransactionQuery};
use crate::browser::{BrowserLauncher, BrowserPage, Selector};
use crate::config::AggregatorConfig;
use crate::types::{AggregatorAccount, ShapedTransaction, Transaction, TrackerError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const USER_DATA_INPUT: Selector = Selector::Name("javascript-user");
const LOGOUT_LINK: Selector = Selector::Id("link-logout");

/// First id used for bundled service requests.
const FIRST_REQUEST_ID: u32 = 42;

const ACCOUNT_TYPES: &[&str] = &[
    "BANK",
    "CREDIT",
    "INVESTMENT",
    "LOAN",
    "MORTGAGE",
    "OTHER_PROPERTY",
    "REAL_ESTATE",
    "VEHICLE",
    "UNCLASSIFIED",
];

/// Account types whose balances count against net worth.
const LIABILITY_TYPES: &[&str] = &["loan", "loans", "credit"];

const JSON_ACCEPT: &str = "application/json";

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UserData {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CategoryTree {
    #[serde(default)]
    all_categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TransactionFeed {
    set: Vec<TransactionSet>,
}

#[derive(Debug, Deserialize)]
struct TransactionSet {
    #[serde(default)]
    data: Vec<Transaction>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A signed-in Mint session.
pub struct MintClient {
    page: Box<dyn BrowserPage>,
    http: Client,
    root_url: String,
    token: String,
    request_id: AtomicU32,
}

impl MintClient {
    /// Sign in through the browser and attach to the resulting session.
    pub async fn sign_in(
        launcher: &dyn BrowserLauncher,
        codes: &dyn VerificationCodeSource,
        credentials: &Credentials,
        cfg: &AggregatorConfig,
    ) -> Result<Self> {
        let settings = LoginSettings::from(cfg);
        let page = login::sign_in(launcher, codes, credentials, &settings).await?;
        Self::attach(page, &cfg.root_url).await
    }

    /// Build a client on a page that is already signed in.
    /// The page is quit if the session cannot be attached.
    pub async fn attach(page: Box<dyn BrowserPage>, root_url: &str) -> Result<Self> {
        match Self::session_parts(page.as_ref(), root_url).await {
            Ok((http, token)) => Ok(Self {
                page,
                http,
                root_url: root_url.trim_end_matches('/').to_string(),
                token,
                request_id: AtomicU32::new(FIRST_REQUEST_ID),
            }),
            Err(e) => {
                if let Err(quit_err) = page.quit().await {
                    warn!(error = %quit_err, "Failed to quit webdriver");
                }
                Err(e)
            }
        }
    }

    async fn session_parts(page: &dyn BrowserPage, root_url: &str) -> Result<(Client, String)> {
        let user_json = page
            .attribute(USER_DATA_INPUT, "value")
            .await?
            .context("Mint user data input has no value")?;
        let token = parse_user_token(&user_json)?;

        let url = Url::parse(root_url).with_context(|| format!("Invalid Mint URL: {root_url}"))?;
        let jar = Jar::default();
        let cookies = page.cookies().await?;
        debug!(count = cookies.len(), "Copying browser cookies");
        for (name, value) in &cookies {
            jar.add_cookie_str(&format!("{name}={value}"), &url);
        }

        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .cookie_provider(Arc::new(jar))
            .build()
            .context("Failed to build HTTP client for Mint")?;

        Ok((http, token))
    }

    fn next_request_id(&self) -> String {
        self.request_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    fn service_url(&self) -> String {
        format!(
            "{}/bundledServiceController.xevent?legacy=false&token={}",
            self.root_url, self.token
        )
    }

    /// Call a bundled service task and return its `response` payload.
    async fn call_service(
        &self,
        service: &str,
        task: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let req_id = self.next_request_id();
        let input = serde_json::json!([{
            "args": args,
            "id": req_id,
            "service": service,
            "task": task,
        }]);

        debug!(service, task, req_id = %req_id, "Calling Mint service");

        let resp = self
            .http
            .post(self.service_url())
            .header("accept", JSON_ACCEPT)
            .form(&[("input", input.to_string())])
            .send()
            .await
            .with_context(|| format!("Mint {service}/{task} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!(TrackerError::Aggregator(format!(
                "{service}/{task} returned HTTP {status}"
            )));
        }

        let body = resp.text().await.context("Failed to read Mint response")?;
        Ok(extract_service_response(&body, &req_id)?)
    }

    /// Ask Mint to refresh every linked institution.
    pub async fn initiate_account_refresh(&self) -> Result<()> {
        info!("Refreshing aggregator account details");
        self.http
            .post(format!("{}/refreshFILogins.xevent", self.root_url))
            .header("accept", JSON_ACCEPT)
            .form(&[("token", self.token.as_str())])
            .send()
            .await
            .context("Mint account refresh request failed")?;
        Ok(())
    }

    /// All accounts of every type, sorted the way Mint sorts them.
    pub async fn get_accounts(&self) -> Result<Vec<AggregatorAccount>> {
        let payload = self
            .call_service(
                "MintAccountService",
                "getAccountsSorted",
                serde_json::json!({ "types": ACCOUNT_TYPES }),
            )
            .await?;

        let accounts: Vec<AggregatorAccount> =
            serde_json::from_value(payload).context("Failed to parse Mint account data")?;

        for account in &accounts {
            let dates: Vec<String> = account
                .dates()
                .iter()
                .map(|(k, v)| format!("{k}={}", shaping::format_datetime(v, shaping::DateFormat::Excel)))
                .collect();
            debug!(account = %account.label(), dates = ?dates, "Account");
        }

        info!(count = accounts.len(), "Fetched aggregator accounts");
        Ok(accounts)
    }

    /// Every category name, parents and children alike.
    pub async fn get_categories(&self) -> Result<Vec<String>> {
        let payload = self
            .call_service(
                "MintCategoryService",
                "getCategoryTreeDto2",
                serde_json::json!({
                    "excludedCategories": [],
                    "sortByPrecedence": false,
                    "categoryTypeFilter": "FREE",
                }),
            )
            .await?;

        let names = parse_categories(payload)?;
        info!(count = names.len(), "Fetched aggregator categories");
        Ok(names)
    }

    /// Set a user property. This changes what the web UI shows too.
    pub async fn set_user_property(&self, name: &str, value: &str) -> Result<()> {
        self.call_service(
            "MintUserService",
            "setUserProperty",
            serde_json::json!({ "propertyName": name, "propertyValue": value }),
        )
        .await
        .with_context(|| format!("Could not set user property {name}"))?;
        Ok(())
    }

    /// Raw transactions, newest first.
    ///
    /// Mint returns one page at a time; pages are requested until an empty
    /// one, or until a page reaches back past `start_date`.
    pub async fn get_transactions(&self, query: &TransactionQuery) -> Result<Vec<Transaction>> {
        // Global user setting; affects the web UI as well.
        self.set_user_property("hide_duplicates", if query.skip_duplicates { "T" } else { "F" })
            .await?;

        let year = shaping_year();
        let mut all = Vec::new();
        let mut offset = 0usize;

        loop {
            let url = transactions_url(&self.root_url, offset, &random_token(), query.include_investment);
            let page = self.fetch_transaction_page(&url).await?;
            if page.is_empty() {
                break;
            }
            let fetched = page.len();

            if let Some(start) = query.start_date {
                let (kept, reached_start) = trim_to_start(page, start, year)?;
                all.extend(kept);
                if reached_start {
                    break;
                }
            } else {
                all.extend(page);
            }

            offset += fetched;
            debug!(offset, total = all.len(), "Fetched transaction page");
        }

        info!(count = all.len(), "Fetched aggregator transactions");
        Ok(all)
    }

    async fn fetch_transaction_page(&self, url: &str) -> Result<Vec<Transaction>> {
        let resp = self
            .http
            .get(url)
            .header("accept", JSON_ACCEPT)
            .send()
            .await
            .context("Mint transaction request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            anyhow::bail!(TrackerError::Aggregator(format!(
                "Error requesting transactions, status = {status}"
            )));
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_json_content_type(&content_type) {
            anyhow::bail!(TrackerError::Aggregator(format!(
                "Unexpected transaction content type {content_type:?}"
            )));
        }

        let feed: TransactionFeed = resp
            .json()
            .await
            .context("Failed to parse Mint transaction feed")?;

        Ok(feed.set.into_iter().next().map(|s| s.data).unwrap_or_default())
    }

    /// Transactions with parsed dates and signed amounts.
    pub async fn get_detailed_transactions(
        &self,
        query: &TransactionQuery,
    ) -> Result<Vec<ShapedTransaction>> {
        let raw = self.get_transactions(query).await?;
        Ok(shape_all(&raw, Utc::now().date_naive(), query.remove_pending)?)
    }

    /// Log out and end the browser session.
    pub async fn close(&self) -> Result<()> {
        info!("Logging out");
        let logout = async {
            self.page.set_implicit_wait(Duration::from_secs(1)).await?;
            self.page.click(LOGOUT_LINK).await
        };
        if let Err(e) = logout.await {
            debug!(error = %e, "Logout link unavailable");
        }

        self.page.quit().await?;
        Ok(())
    }
}

#[async_trait]
impl Aggregator for MintClient {
    async fn refresh_accounts(&self) -> Result<()> {
        self.initiate_account_refresh().await
    }

    async fn accounts(&self) -> Result<Vec<AggregatorAccount>> {
        self.get_accounts().await
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<ShapedTransaction>> {
        self.get_detailed_transactions(query).await
    }

    async fn categories(&self) -> Result<Vec<String>> {
        self.get_categories().await
    }

    async fn close(&self) -> Result<()> {
        MintClient::close(self).await
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read the API token out of the `javascript-user` JSON blob.
fn parse_user_token(user_json: &str) -> Result<String> {
    let data: UserData =
        serde_json::from_str(user_json).context("Mint user data is not valid JSON")?;
    Ok(data.token)
}

/// Pull `response[req_id].response` out of a bundled service reply.
fn extract_service_response(body: &str, req_id: &str) -> Result<serde_json::Value, TrackerError> {
    if !body.contains(req_id) {
        return Err(TrackerError::Aggregator(format!(
            "Could not parse service response: {body}"
        )));
    }

    let mut json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| TrackerError::Aggregator(format!("Invalid service JSON: {e}")))?;

    json.get_mut("response")
        .and_then(|r| r.get_mut(req_id))
        .and_then(|r| r.get_mut("response"))
        .map(serde_json::Value::take)
        .ok_or_else(|| TrackerError::Aggregator(format!("No response for request {req_id}")))
}

fn parse_categories(payload: serde_json::Value) -> Result<Vec<String>> {
    let tree: CategoryTree =
        serde_json::from_value(payload).context("Failed to parse Mint category data")?;
    Ok(tree.all_categories.into_iter().map(|c| c.name).collect())
}

fn transactions_url(root_url: &str, offset: usize, rnd: &str, include_investment: bool) -> String {
    // accountId=0 makes Mint include investment transactions.
    let options = if include_investment {
        "accountId=0&task=transactions"
    } else {
        "task=transactions,txnfilters&filterType=cash"
    };
    format!(
        "{root_url}/getJsonData.xevent?queryNew=&offset={offset}&comparableType=8&rnd={rnd}&{options}"
    )
}

fn is_json_content_type(content_type: &str) -> bool {
    content_type.starts_with("text/json") || content_type.starts_with("application/json")
}

/// Cache-busting request token: unix seconds followed by three digits.
fn random_token() -> String {
    let now = Utc::now();
    format!("{}{:03}", now.timestamp(), now.timestamp_subsec_millis() % 1000)
}

fn shaping_year() -> i32 {
    use chrono::Datelike;
    Utc::now().date_naive().iso_week().year()
}

/// Keep transactions on or after `start`. The second value is true once
/// the page's oldest transaction predates `start`.
fn trim_to_start(
    page: Vec<Transaction>,
    start: NaiveDate,
    year: i32,
) -> Result<(Vec<Transaction>, bool)> {
    let date_of = |t: &Transaction| {
        shaping::parse_transaction_date(&t.odate, year)
            .with_context(|| format!("Unparseable transaction date: {}", t.odate))
    };

    let oldest = match page.last() {
        Some(t) => date_of(t)?,
        None => return Ok((page, false)),
    };
    if oldest >= start {
        return Ok((page, false));
    }

    let mut kept = Vec::with_capacity(page.len());
    for t in page {
        if date_of(&t)? >= start {
            kept.push(t);
        }
    }
    Ok((kept, true))
}

/// Shape raw transactions, optionally dropping pending ones.
pub fn shape_all(
    raw: &[Transaction],
    today: NaiveDate,
    remove_pending: bool,
) -> Result<Vec<ShapedTransaction>, TrackerError> {
    raw.iter()
        .filter(|t| !(remove_pending && t.is_pending))
        .map(|t| shaping::shape_transaction(t, today))
        .collect()
}

/// Net worth of active accounts: assets minus loan and credit balances.
pub fn net_worth(accounts: &[AggregatorAccount]) -> Decimal {
    accounts
        .iter()
        .filter(|a| a.is_active)
        .map(|a| {
            if LIABILITY_TYPES.contains(&a.account_type.as_str()) {
                -a.current_balance
            } else {
                a.current_balance
            }
        })
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
