//! End-to-end run against in-memory fakes.

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use fintracker::config::{AppConfig, ColumnSpec, SheetsConfig};
use fintracker::engine::runner::{RunOptions, Runner};
use fintracker::types::{AggregatorAccount, PortfolioValue, ShapedTransaction};

use crate::fakes::{entries, journal, FakeAggregator, FakeBrokerage, Journal, MemorySheet};

fn sheets_cfg() -> SheetsConfig {
    SheetsConfig {
        spreadsheet_id_env: "MASTER_SHEET_ID".into(),
        finances_sheet: "Finances".into(),
        finances_span: "A:N".into(),
        expenses_sheet: "Expenses".into(),
        columns: vec![
            ColumnSpec::Label("Chase: Checking".into()),
            ColumnSpec::Label("Amex: Gold".into()),
            ColumnSpec::Label(String::new()),
            ColumnSpec::Label("Robinhood".into()),
        ],
    }
}

fn accounts() -> Vec<AggregatorAccount> {
    serde_json::from_value(json!([
        {
            "fiName": "Chase",
            "accountName": "Checking",
            "value": 2500.75,
            "currentBalance": 2500.75,
            "accountType": "bank",
            "isActive": true,
        },
        {
            "fiName": "Amex",
            "accountName": "Gold",
            "value": -400.25,
            "currentBalance": 400.25,
            "accountType": "credit",
            "isActive": true,
        },
    ]))
    .unwrap()
}

fn history() -> Vec<Vec<Value>> {
    vec![
        vec![json!("Date"), json!("Chase: Checking")],
        vec![json!("10/17/2026"), json!(2400)],
        vec![json!("10/18/2026"), json!(2450)],
    ]
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

async fn run_once(
    sheet: &MemorySheet,
    accounts: Option<Vec<AggregatorAccount>>,
    transactions: Vec<ShapedTransaction>,
    portfolio: PortfolioValue,
    opts: &RunOptions,
    log: &Journal,
) -> fintracker::engine::runner::RunReport {
    let aggregator = FakeAggregator::new(accounts, transactions, log.clone());
    run_with(sheet, &aggregator, portfolio, opts, log).await
}

async fn run_with(
    sheet: &MemorySheet,
    aggregator: &FakeAggregator,
    portfolio: PortfolioValue,
    opts: &RunOptions,
    log: &Journal,
) -> fintracker::engine::runner::RunReport {
    let brokerage = FakeBrokerage::new(portfolio, log.clone());
    let cfg = sheets_cfg();
    let runner = Runner {
        brokerage: &brokerage,
        brokerage_label: "Robinhood",
        sheets: sheet,
        sheets_cfg: &cfg,
        alerts: None,
    };
    runner.run(aggregator, opts, today()).await.unwrap()
}

#[tokio::test]
async fn test_snapshot_appended_then_overwritten() {
    let log = journal();
    let sheet = MemorySheet::with_rows("Finances", history(), log.clone());
    let opts = RunOptions {
        refresh: true,
        ..RunOptions::default()
    };

    let first = run_once(&sheet, Some(accounts()), vec![], PortfolioValue::Equity(dec!(900)), &opts, &log).await;
    assert_eq!(first.finances_row, Some(4));
    assert_eq!(first.net_worth, Some(dec!(2100.50)));

    let rows = sheet.rows("Finances");
    assert_eq!(rows.len(), 4);
    assert_eq!(
        rows[3],
        vec![
            json!("10/19/2026"),
            json!(2500.75),
            json!(400.25),
            Value::Null,
            json!(900.0),
        ]
    );

    let second = run_once(&sheet, Some(accounts()), vec![], PortfolioValue::Equity(dec!(950)), &opts, &log).await;
    assert_eq!(second.finances_row, Some(4));
    let rows = sheet.rows("Finances");
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[3][4], json!(950.0));
}

#[tokio::test]
async fn test_session_closed_before_sheet_writes() {
    let log = journal();
    let sheet = MemorySheet::with_rows("Finances", history(), log.clone());
    let opts = RunOptions {
        refresh: true,
        ..RunOptions::default()
    };

    run_once(&sheet, None, vec![], PortfolioValue::BadLogin, &opts, &log).await;

    assert_eq!(
        entries(&log),
        vec![
            "aggregator: refresh",
            "aggregator: accounts",
            "aggregator: close",
            "brokerage: portfolio",
            "sheet: write Finances!A4",
        ]
    );
    let rows = sheet.rows("Finances");
    assert_eq!(rows[3], vec![json!("10/19/2026"), Value::Null, Value::Null, Value::Null, json!("BADLOGIN")]);
}

#[tokio::test]
async fn test_empty_finances_sheet_is_left_alone() {
    let log = journal();
    let sheet = MemorySheet::with_rows("Finances", vec![], log.clone());

    let report = run_once(
        &sheet,
        Some(accounts()),
        vec![],
        PortfolioValue::Equity(dec!(1)),
        &RunOptions::default(),
        &log,
    )
    .await;

    assert_eq!(report.finances_row, None);
    assert!(sheet.rows("Finances").is_empty());
    assert!(!entries(&log).iter().any(|e| e.starts_with("sheet:")));
}

#[tokio::test]
async fn test_expenses_sheet_written() {
    let log = journal();
    let sheet = MemorySheet::with_rows("Finances", history(), log.clone());
    let day = |d| NaiveDate::from_ymd_opt(2026, 10, d).unwrap();
    let txn = |d, amount, category: &str| ShapedTransaction {
        date: day(d),
        amount,
        category: category.into(),
        merchant: "Shop".into(),
        is_pending: false,
    };
    let transactions = vec![
        txn(1, dec!(99), "restaurants"),
        txn(12, dec!(20), "groceries"),
        txn(12, dec!(5.5), "groceries"),
        txn(14, dec!(-1000), "paycheck"),
    ];
    let opts = RunOptions {
        expenses: true,
        since: Some(day(10)),
        ..RunOptions::default()
    };

    let aggregator = FakeAggregator::new(Some(accounts()), transactions, log.clone())
        .with_categories(&["Groceries", "Paycheck", "Restaurants"]);

    let report = run_with(&sheet, &aggregator, PortfolioValue::Equity(dec!(1)), &opts, &log).await;
    assert_eq!(report.expense_days, Some(2));
    assert!(entries(&log).contains(&"aggregator: categories".to_string()));

    let expenses = sheet.rows("Expenses");
    assert_eq!(
        expenses[0],
        vec![json!("Date"), json!("Groceries"), json!("Paycheck"), json!("Restaurants")]
    );
    assert_eq!(expenses[1], vec![json!("10/12/2026"), json!(25.5), json!(0.0), json!(0.0)]);
    assert_eq!(expenses[2], vec![json!("10/14/2026"), json!(0.0), json!(-1000.0), json!(0.0)]);
}

#[test]
fn test_shipped_config_parses() {
    let cfg = AppConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
    assert_eq!(cfg.brokerage.label, "Robinhood");
    assert!(!cfg.sheets.columns.is_empty());
}
