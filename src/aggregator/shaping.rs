//! Pure data-shaping helpers for aggregator records.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::types::{ShapedTransaction, Transaction, TrackerError};

/// Output formats for account date fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    Date,
    Iso8601,
    Excel,
}

impl DateFormat {
    fn pattern(self) -> &'static str {
        match self {
            DateFormat::Date => "%Y-%m-%d",
            DateFormat::Iso8601 => "%Y-%m-%dT%H:%M:%SZ",
            DateFormat::Excel => "%Y-%m-%d %H:%M:%S",
        }
    }
}

/// Convert a JavaScript millisecond timestamp to `DateTime<Utc>`.
pub fn millis_to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

pub fn format_datetime(dt: &DateTime<Utc>, format: DateFormat) -> String {
    dt.format(format.pattern()).to_string()
}

/// Date cell for the spreadsheet: `M/D/YYYY`, no zero padding.
pub fn sheet_date(date: NaiveDate) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

/// Parse a transaction date.
///
/// Current-year transactions come as `"Oct 5"` and take `current_year`;
/// older ones come as `"10/05/18"`.
pub fn parse_transaction_date(raw: &str, current_year: i32) -> Option<NaiveDate> {
    let with_year = format!("{} {current_year}", raw.trim());
    NaiveDate::parse_from_str(&with_year, "%b %d %Y")
        .or_else(|_| NaiveDate::parse_from_str(raw.trim(), "%m/%d/%y"))
        .ok()
}

fn ignored_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[$,%]").expect("static regex"))
}

/// Parse a currency or percentage string, ignoring `$`, `,` and `%`.
pub fn parse_money(raw: &str) -> Option<Decimal> {
    let cleaned = ignored_chars().replace_all(raw.trim(), "");
    Decimal::from_str(&cleaned).ok()
}

/// Signed amount: debits are positive, credits negative.
pub fn signed_amount(raw: &str, is_debit: bool) -> Result<Decimal, TrackerError> {
    let amount = parse_money(raw).ok_or_else(|| TrackerError::InvalidAmount(raw.to_string()))?;
    Ok(if is_debit { amount } else { -amount })
}

/// Parse and sign a raw transaction. `today` supplies the implied year.
pub fn shape_transaction(
    txn: &Transaction,
    today: NaiveDate,
) -> Result<ShapedTransaction, TrackerError> {
    // The feed leaves the year off using the ISO calendar year.
    let year = today.iso_week().year();
    let date = parse_transaction_date(&txn.odate, year)
        .ok_or_else(|| TrackerError::Aggregator(format!("Unparseable date: {}", txn.odate)))?;

    Ok(ShapedTransaction {
        date,
        amount: signed_amount(&txn.amount, txn.is_debit)?,
        category: txn.category.clone(),
        merchant: txn.merchant.clone(),
        is_pending: txn.is_pending,
    })
}
