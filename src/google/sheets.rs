//! Google Sheets integration.
//!
//! Writes the daily findata row to the finances sheet, overwriting the
//! last row when it is already today's, and rewrites the expenses sheet.
//!
//! API docs: https://developers.google.com/sheets/api/reference/rest
//! Base URL: https://sheets.googleapis.com/v4/spreadsheets

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::credentials::{GoogleAuth, SPREADSHEETS};
use crate::aggregator::shaping::sheet_date;
use crate::config::{ColumnSpec, SheetsConfig};
use crate::engine::expenses::ExpenseTable;
use crate::engine::findata::log_findata;
use crate::types::FinData;

const BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const APP: &str = "sheets";

pub type Row = Vec<Value>;

// ---------------------------------------------------------------------------
// Store abstraction
// ---------------------------------------------------------------------------

/// Read/write access to one spreadsheet.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SheetStore: Send + Sync {
    /// Cell values in A1 `range`; trailing empty rows and cells are omitted.
    async fn read_range(&self, range: &str) -> Result<Vec<Row>>;

    /// Write `values` starting at `range`, parsed as if typed by a user.
    async fn write_range(&self, range: &str, values: Vec<Row>) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

pub struct SheetsClient {
    http: Client,
    auth: GoogleAuth,
    spreadsheet_id: String,
}

impl SheetsClient {
    pub fn new(auth: GoogleAuth, spreadsheet_id: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client for Sheets")?;

        Ok(Self {
            http,
            auth,
            spreadsheet_id: spreadsheet_id.into(),
        })
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{BASE_URL}/{}/values/{}",
            self.spreadsheet_id,
            urlencoding::encode(range)
        )
    }
}

#[async_trait]
impl SheetStore for SheetsClient {
    async fn read_range(&self, range: &str) -> Result<Vec<Row>> {
        let token = self.auth.access_token(APP, &[SPREADSHEETS]).await?;
        debug!(range, "Reading sheet range");

        let resp = self
            .http
            .get(self.values_url(range))
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .context("Sheets read request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Sheets read of {range} failed {status}: {body}");
        }

        let data: ValueRange = resp
            .json()
            .await
            .context("Failed to parse Sheets value range")?;
        Ok(data.values)
    }

    async fn write_range(&self, range: &str, values: Vec<Row>) -> Result<()> {
        let token = self.auth.access_token(APP, &[SPREADSHEETS]).await?;
        let url = format!("{}?valueInputOption=USER_ENTERED", self.values_url(range));
        let body = serde_json::json!({ "majorDimension": "ROWS", "values": values });

        let resp = self
            .http
            .put(&url)
            .bearer_auth(token.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Sheets write request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Sheets write to {range} failed {status}: {body}");
        }

        debug!(range, rows = values.len(), "Wrote sheet range");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Finances sheet
// ---------------------------------------------------------------------------

/// 1-based row to write today's snapshot to.
///
/// `None` when the sheet has no data at all. If the last row's first cell
/// is `today`, that row is reused; otherwise the row after it.
pub fn target_row(existing: &[Row], today: &str) -> Option<usize> {
    let last = existing.last()?;
    let last_date = last.first().and_then(Value::as_str);
    if last_date == Some(today) {
        Some(existing.len())
    } else {
        Some(existing.len() + 1)
    }
}

/// The date cell followed by one cell per configured column.
/// Labels absent from `findata` become blank cells.
pub fn build_finances_row(today: &str, columns: &[ColumnSpec], findata: &FinData) -> Row {
    let mut row = Vec::with_capacity(columns.len() + 1);
    row.push(Value::String(today.to_string()));

    for column in columns {
        let cell = match column {
            ColumnSpec::Literal(n) => serde_json::json!(n),
            ColumnSpec::Label(label) if label.is_empty() => Value::Null,
            ColumnSpec::Label(label) => match findata.get(label) {
                Some(value) => value.to_cell(),
                None => {
                    warn!(label = %label, "No findata for column, leaving blank");
                    Value::Null
                }
            },
        };
        row.push(cell);
    }
    row
}

/// Write today's findata row. Returns the row written, if any.
pub async fn update_finances_sheet(
    store: &dyn SheetStore,
    cfg: &SheetsConfig,
    findata: &FinData,
    today: NaiveDate,
) -> Result<Option<usize>> {
    info!("Updating finances sheet");
    log_findata(findata);
    let read_range = format!("{}!{}", cfg.finances_sheet, cfg.finances_span);
    let existing = store.read_range(&read_range).await?;

    let today = sheet_date(today);
    let Some(row_number) = target_row(&existing, &today) else {
        warn!(range = %read_range, "No data found.");
        return Ok(None);
    };
    if row_number == existing.len() {
        info!(row = row_number, "Overwriting today's row with new data");
    }

    let row = build_finances_row(&today, &cfg.columns, findata);
    let write_range = format!("{}!A{row_number}", cfg.finances_sheet);
    store.write_range(&write_range, vec![row]).await?;

    info!(range = %write_range, "Finances sheet updated");
    Ok(Some(row_number))
}

// ---------------------------------------------------------------------------
// Expenses sheet
// ---------------------------------------------------------------------------

/// Header at `A1`, one row per day from `A2`.
pub async fn update_expenses_sheet(
    store: &dyn SheetStore,
    sheet: &str,
    table: &ExpenseTable,
) -> Result<()> {
    info!(days = table.len(), "Updating expenses sheet");
    store
        .write_range(&format!("{sheet}!A1"), vec![table.header()])
        .await?;

    if !table.is_empty() {
        store
            .write_range(&format!("{sheet}!A2"), table.rows())
            .await?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
