//! Run pipeline.
//!
//! Harvests the signed-in aggregator session, closes it, adds the
//! brokerage value, and writes the snapshot to the spreadsheet. Every step
//! is awaited in order.

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::aggregator::mint::net_worth;
use crate::aggregator::{Aggregator, TransactionQuery};
use crate::brokerage::Brokerage;
use crate::config::SheetsConfig;
use crate::engine::expenses::ExpenseTable;
use crate::engine::findata;
use crate::google::gmail::Mailer;
use crate::google::sheets::{self, SheetStore};
use crate::types::{AggregatorAccount, FinData, ShapedTransaction};

// ---------------------------------------------------------------------------
// Options and report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Ask the aggregator to re-poll institutions first.
    pub refresh: bool,
    /// Also rewrite the expenses sheet.
    pub expenses: bool,
    /// Earliest transaction date for the expenses sheet.
    pub since: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub findata: FinData,
    /// `None` when accounts could not be fetched.
    pub net_worth: Option<Decimal>,
    /// 1-based finances row written, if any.
    pub finances_row: Option<usize>,
    /// Days written to the expenses sheet.
    pub expense_days: Option<usize>,
    pub alert_sent: bool,
}

/// What was read from the aggregator before the session closed.
#[derive(Debug, Default)]
pub struct Harvest {
    pub accounts: Option<Vec<AggregatorAccount>>,
    pub transactions: Option<Vec<ShapedTransaction>>,
    /// Aggregator category names; empty if they could not be fetched.
    pub categories: Vec<String>,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Where degraded-run alerts go.
pub struct Alerting<'a> {
    pub mailer: &'a dyn Mailer,
    pub to: String,
}

pub struct Runner<'a> {
    pub brokerage: &'a dyn Brokerage,
    /// Findata label for the brokerage value.
    pub brokerage_label: &'a str,
    pub sheets: &'a dyn SheetStore,
    pub sheets_cfg: &'a SheetsConfig,
    pub alerts: Option<Alerting<'a>>,
}

impl<'a> Runner<'a> {
    /// Run once against a signed-in aggregator session.
    pub async fn run(
        &self,
        aggregator: &dyn Aggregator,
        opts: &RunOptions,
        today: NaiveDate,
    ) -> Result<RunReport> {
        let harvest = harvest(aggregator, opts).await?;

        info!(brokerage = self.brokerage.name(), "Retrieving brokerage portfolio");
        let portfolio = self.brokerage.portfolio_value().await?;

        let findata = findata::collect(harvest.accounts.as_deref(), self.brokerage_label, portfolio);
        let net_worth = harvest.accounts.as_deref().map(net_worth);
        match net_worth {
            Some(total) => info!(net_worth = %format!("{total:.2}"), "Net worth"),
            None => warn!("Net worth unavailable"),
        }

        let finances_row =
            sheets::update_finances_sheet(self.sheets, self.sheets_cfg, &findata, today).await?;

        let expense_days = match &harvest.transactions {
            Some(txns) => {
                let table = ExpenseTable::tabulate(txns).with_categories(&harvest.categories);
                sheets::update_expenses_sheet(self.sheets, &self.sheets_cfg.expenses_sheet, &table)
                    .await?;
                Some(table.len())
            }
            None => None,
        };

        let alert_sent = match alert_message(harvest.accounts.is_some(), &findata) {
            Some((subject, body)) => self.send_alert(&subject, &body).await,
            None => false,
        };

        Ok(RunReport {
            findata,
            net_worth,
            finances_row,
            expense_days,
            alert_sent,
        })
    }

    /// Send failures are logged, never raised.
    async fn send_alert(&self, subject: &str, body: &str) -> bool {
        let Some(alerts) = &self.alerts else {
            warn!(subject, "Degraded run and no alert address configured");
            return false;
        };
        match alerts.mailer.send_email(&alerts.to, subject, body).await {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "Failed to send alert email");
                false
            }
        }
    }
}

/// Read everything needed from the aggregator, then close it.
///
/// The session is closed on every path. Account failures leave
/// `accounts` empty and the run continues; transaction failures skip the
/// expenses sheet. A failed refresh is returned after closing.
pub async fn harvest(aggregator: &dyn Aggregator, opts: &RunOptions) -> Result<Harvest> {
    let result = read_session(aggregator, opts).await;

    if let Err(e) = aggregator.close().await {
        warn!(error = %e, "Failed to close aggregator session");
    }
    result
}

async fn read_session(aggregator: &dyn Aggregator, opts: &RunOptions) -> Result<Harvest> {
    if opts.refresh {
        aggregator.refresh_accounts().await?;
    }

    info!("Getting accounts data");
    let accounts = match aggregator.accounts().await {
        Ok(accounts) => Some(accounts),
        Err(e) => {
            error!(error = %e, "get_accounts failed");
            None
        }
    };

    let mut transactions = None;
    let mut categories = Vec::new();
    if opts.expenses {
        let query = TransactionQuery {
            start_date: opts.since,
            ..TransactionQuery::default()
        };
        match aggregator.transactions(&query).await {
            Ok(txns) => transactions = Some(txns),
            Err(e) => error!(error = %e, "Transaction fetch failed, skipping expenses sheet"),
        }

        if transactions.is_some() {
            match aggregator.categories().await {
                Ok(names) => categories = names,
                Err(e) => warn!(error = %e, "Category fetch failed, using transaction categories"),
            }
        }
    }

    Ok(Harvest {
        accounts,
        transactions,
        categories,
    })
}

/// Subject and body for a degraded snapshot, or `None` when all is well.
pub fn alert_message(accounts_ok: bool, findata: &FinData) -> Option<(String, String)> {
    let unavailable = findata.unavailable();
    if accounts_ok && unavailable.is_empty() {
        return None;
    }

    let mut lines = Vec::new();
    if !accounts_ok {
        lines.push("Aggregator accounts could not be retrieved.".to_string());
    }
    for label in &unavailable {
        if let Some(value) = findata.get(label) {
            lines.push(format!("{label}: {value}"));
        }
    }
    Some(("fintracker: degraded snapshot".to_string(), lines.join("\n")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
