//! Shared types for fintracker.
//!
//! These types form the per-run data model: raw aggregator records,
//! their shaped forms, and the findata mapping written to the sheet.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::aggregator::shaping;

// ---------------------------------------------------------------------------
// Aggregator records
// ---------------------------------------------------------------------------

/// Account record as returned by the aggregator's account service.
/// Only the fields we use are deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorAccount {
    pub fi_name: String,
    pub account_name: String,
    /// Reported balance; sign depends on the account type.
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub current_balance: Decimal,
    /// "bank", "credit", "loan", "investment", ...
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub is_active: bool,

    // Millisecond timestamps. Left as raw JSON because the service
    // occasionally returns non-numeric placeholders.
    #[serde(default)]
    pub add_account_date: Option<serde_json::Value>,
    #[serde(default)]
    pub close_date: Option<serde_json::Value>,
    #[serde(default)]
    pub fi_last_updated: Option<serde_json::Value>,
    #[serde(default)]
    pub last_updated: Option<serde_json::Value>,
}

impl AggregatorAccount {
    /// Human-readable findata label: `"<institution>: <account>"`.
    pub fn label(&self) -> String {
        format!("{}: {}", self.fi_name, self.account_name)
    }

    /// Date fields that hold numeric timestamps, converted to UTC.
    pub fn dates(&self) -> BTreeMap<&'static str, DateTime<Utc>> {
        let fields = [
            ("addAccountDate", &self.add_account_date),
            ("closeDate", &self.close_date),
            ("fiLastUpdated", &self.fi_last_updated),
            ("lastUpdated", &self.last_updated),
        ];

        fields
            .into_iter()
            .filter_map(|(name, raw)| {
                let ms = raw.as_ref()?.as_i64()?;
                shaping::millis_to_datetime(ms).map(|dt| (name, dt))
            })
            .collect()
    }
}

/// Transaction record from the aggregator's paged JSON feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// `"Oct 5"` for the current year, `"10/05/18"` otherwise.
    pub odate: String,
    /// Currency string, e.g. `"$1,234.56"`; always unsigned.
    pub amount: String,
    pub is_debit: bool,
    #[serde(default)]
    pub is_pending: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub merchant: String,
}

/// A transaction with its date parsed and amount signed
/// (debits positive, credits negative).
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedTransaction {
    pub date: NaiveDate,
    pub amount: Decimal,
    pub category: String,
    pub merchant: String,
    pub is_pending: bool,
}

// ---------------------------------------------------------------------------
// Findata
// ---------------------------------------------------------------------------

/// One account's contribution to the findata mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    pub institution: String,
    pub account: String,
    /// Absolute value of the reported balance.
    pub balance: Decimal,
}

impl AccountSnapshot {
    pub fn label(&self) -> String {
        format!("{}: {}", self.institution, self.account)
    }
}

impl From<&AggregatorAccount> for AccountSnapshot {
    fn from(acct: &AggregatorAccount) -> Self {
        Self {
            institution: acct.fi_name.clone(),
            account: acct.account_name.clone(),
            balance: acct.value.abs(),
        }
    }
}

/// One balance in the findata mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum FinValue {
    Amount(Decimal),
    /// A value that could not be fetched, written to the sheet verbatim.
    Unavailable(&'static str),
}

impl FinValue {
    /// JSON cell value for the spreadsheet API.
    pub fn to_cell(&self) -> serde_json::Value {
        match self {
            FinValue::Amount(d) => serde_json::to_value(d).unwrap_or(serde_json::Value::Null),
            FinValue::Unavailable(s) => serde_json::Value::String((*s).to_string()),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, FinValue::Amount(_))
    }
}

impl fmt::Display for FinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinValue::Amount(d) => write!(f, "{d:.2}"),
            FinValue::Unavailable(s) => write!(f, "{s}"),
        }
    }
}

/// Per-run label → balance mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FinData(BTreeMap<String, FinValue>);

impl FinData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; a repeated label replaces the earlier value.
    pub fn insert(&mut self, label: impl Into<String>, value: FinValue) -> Option<FinValue> {
        self.0.insert(label.into(), value)
    }

    pub fn get(&self, label: &str) -> Option<&FinValue> {
        self.0.get(label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FinValue)> {
        self.0.iter()
    }

    /// Labels whose value is a sentinel rather than an amount.
    pub fn unavailable(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_available())
            .map(|(k, _)| k.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Brokerage
// ---------------------------------------------------------------------------

/// Sentinel written when the brokerage rejects the login.
pub const BAD_LOGIN: &str = "BADLOGIN";

/// Result of a brokerage portfolio query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortfolioValue {
    Equity(Decimal),
    BadLogin,
}

impl From<PortfolioValue> for FinValue {
    fn from(v: PortfolioValue) -> Self {
        match v {
            PortfolioValue::Equity(d) => FinValue::Amount(d),
            PortfolioValue::BadLogin => FinValue::Unavailable(BAD_LOGIN),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors callers branch on.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Aggregator error: {0}")]
    Aggregator(String),

    #[error("Sign-in gave up after {0} polls")]
    LoginTimedOut(u32),

    #[error("Google credentials not found at {0}; run the OAuth setup first")]
    MissingCredentials(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
