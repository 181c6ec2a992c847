//! Hand-written fakes for integration testing.
//!
//! `FakePage` is a scripted browser: each click can move it to a new
//! screen, and every command is appended to a shared journal. The other
//! fakes stand in for the aggregator, the brokerage and the spreadsheet,
//! all in-memory.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fintracker::aggregator::login::VerificationCodeSource;
use fintracker::aggregator::{Aggregator, TransactionQuery};
use fintracker::brokerage::Brokerage;
use fintracker::browser::{BrowserError, BrowserLauncher, BrowserPage, Selector};
use fintracker::google::sheets::{Row, SheetStore};
use fintracker::types::{AggregatorAccount, PortfolioValue, ShapedTransaction};

pub type Journal = Arc<Mutex<Vec<String>>>;

pub fn journal() -> Journal {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.lock().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Screen {
    pub url: String,
    pub source: String,
}

impl Screen {
    pub fn new(url: &str, source: &str) -> Self {
        Self {
            url: url.to_string(),
            source: source.to_string(),
        }
    }
}

struct PageState {
    screen: Screen,
    /// Selector display text → screen shown after clicking it.
    transitions: HashMap<String, Screen>,
    missing: HashSet<String>,
    quit: bool,
}

/// A scripted browser page.
pub struct FakePage {
    id: usize,
    state: Mutex<PageState>,
    journal: Journal,
}

impl FakePage {
    pub fn new(id: usize, start: Screen, journal: Journal) -> Self {
        Self {
            id,
            state: Mutex::new(PageState {
                screen: start,
                transitions: HashMap::new(),
                missing: HashSet::new(),
                quit: false,
            }),
            journal,
        }
    }

    /// Clicking `target` shows `screen`.
    pub fn on_click(self, target: Selector, screen: Screen) -> Self {
        self.state
            .lock()
            .unwrap()
            .transitions
            .insert(target.to_string(), screen);
        self
    }

    /// Lookups of `target` fail with `ElementNotFound`.
    pub fn without(self, target: Selector) -> Self {
        self.state.lock().unwrap().missing.insert(target.to_string());
        self
    }

    fn record(&self, entry: String) {
        self.journal.lock().unwrap().push(format!("page{}: {entry}", self.id));
    }

    fn lookup(&self, target: Selector) -> Result<(), BrowserError> {
        let state = self.state.lock().unwrap();
        if state.quit {
            return Err(BrowserError::Command("session closed".into()));
        }
        if state.missing.contains(&target.to_string()) {
            return Err(BrowserError::ElementNotFound(target));
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.record(format!("goto {url}"));
        self.state.lock().unwrap().screen.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.state.lock().unwrap().screen.url.clone())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        Ok(self.state.lock().unwrap().screen.source.clone())
    }

    async fn find(&self, target: Selector) -> Result<(), BrowserError> {
        self.lookup(target)
    }

    async fn click(&self, target: Selector) -> Result<(), BrowserError> {
        self.lookup(target)?;
        self.record(format!("click {target}"));
        let mut state = self.state.lock().unwrap();
        if let Some(next) = state.transitions.get(&target.to_string()).cloned() {
            state.screen = next;
        }
        Ok(())
    }

    async fn send_keys(&self, target: Selector, text: &str) -> Result<(), BrowserError> {
        self.lookup(target)?;
        self.record(format!("keys {target}={text}"));
        Ok(())
    }

    async fn attribute(&self, target: Selector, name: &str) -> Result<Option<String>, BrowserError> {
        self.lookup(target)?;
        match (target, name) {
            (Selector::Name("javascript-user"), "value") => {
                Ok(Some(r#"{"token":"fake-token"}"#.to_string()))
            }
            _ => Ok(None),
        }
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.record(format!("wait {}s", timeout.as_secs()));
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError> {
        Ok(vec![("JSESSIONID".into(), "fake".into())])
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        self.record("quit".into());
        self.state.lock().unwrap().quit = true;
        Ok(())
    }
}

/// Hands out pre-built pages in order.
pub struct FakeLauncher {
    pages: Mutex<VecDeque<FakePage>>,
}

impl FakeLauncher {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
        }
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        let page = self
            .pages
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| BrowserError::Session("no more scripted pages".into()))?;
        Ok(Box::new(page))
    }
}

pub struct FixedCode {
    code: String,
    pub calls: Mutex<u32>,
}

impl FixedCode {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl VerificationCodeSource for FixedCode {
    async fn latest_code(&self) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.code.clone())
    }
}

// ---------------------------------------------------------------------------
// Aggregator and brokerage
// ---------------------------------------------------------------------------

pub struct FakeAggregator {
    accounts: Option<Vec<AggregatorAccount>>,
    transactions: Vec<ShapedTransaction>,
    categories: Vec<String>,
    journal: Journal,
}

impl FakeAggregator {
    pub fn new(
        accounts: Option<Vec<AggregatorAccount>>,
        transactions: Vec<ShapedTransaction>,
        journal: Journal,
    ) -> Self {
        Self {
            accounts,
            transactions,
            categories: Vec::new(),
            journal,
        }
    }

    pub fn with_categories(mut self, names: &[&str]) -> Self {
        self.categories = names.iter().map(|n| n.to_string()).collect();
        self
    }

    fn record(&self, entry: &str) {
        self.journal.lock().unwrap().push(format!("aggregator: {entry}"));
    }
}

#[async_trait]
impl Aggregator for FakeAggregator {
    async fn refresh_accounts(&self) -> Result<()> {
        self.record("refresh");
        Ok(())
    }

    async fn accounts(&self) -> Result<Vec<AggregatorAccount>> {
        self.record("accounts");
        self.accounts
            .clone()
            .ok_or_else(|| anyhow!("Could not parse service response"))
    }

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<ShapedTransaction>> {
        self.record("transactions");
        Ok(self
            .transactions
            .iter()
            .filter(|t| query.start_date.map_or(true, |start| t.date >= start))
            .cloned()
            .collect())
    }

    async fn categories(&self) -> Result<Vec<String>> {
        self.record("categories");
        Ok(self.categories.clone())
    }

    async fn close(&self) -> Result<()> {
        self.record("close");
        Ok(())
    }
}

pub struct FakeBrokerage {
    value: PortfolioValue,
    journal: Journal,
}

impl FakeBrokerage {
    pub fn new(value: PortfolioValue, journal: Journal) -> Self {
        Self { value, journal }
    }
}

#[async_trait]
impl Brokerage for FakeBrokerage {
    async fn portfolio_value(&self) -> Result<PortfolioValue> {
        self.journal.lock().unwrap().push("brokerage: portfolio".into());
        Ok(self.value)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

// ---------------------------------------------------------------------------
// Spreadsheet
// ---------------------------------------------------------------------------

/// In-memory spreadsheet keyed by sheet name. Only `Sheet!A<row>` write
/// ranges and whole-sheet reads are understood.
#[derive(Default)]
pub struct MemorySheet {
    sheets: Mutex<HashMap<String, Vec<Row>>>,
    journal: Option<Journal>,
}

impl MemorySheet {
    pub fn with_rows(sheet: &str, rows: Vec<Row>, journal: Journal) -> Self {
        let mut sheets = HashMap::new();
        sheets.insert(sheet.to_string(), rows);
        Self {
            sheets: Mutex::new(sheets),
            journal: Some(journal),
        }
    }

    pub fn rows(&self, sheet: &str) -> Vec<Row> {
        self.sheets
            .lock()
            .unwrap()
            .get(sheet)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SheetStore for MemorySheet {
    async fn read_range(&self, range: &str) -> Result<Vec<Row>> {
        let sheet = range.split('!').next().unwrap_or(range);
        Ok(self.rows(sheet))
    }

    async fn write_range(&self, range: &str, values: Vec<Row>) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.lock().unwrap().push(format!("sheet: write {range}"));
        }

        let (sheet, cell) = range
            .split_once('!')
            .ok_or_else(|| anyhow!("range without sheet: {range}"))?;
        let start: usize = cell
            .strip_prefix('A')
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| anyhow!("unsupported range: {range}"))?;

        let mut sheets = self.sheets.lock().unwrap();
        let rows = sheets.entry(sheet.to_string()).or_default();
        for (offset, row) in values.into_iter().enumerate() {
            let index = start - 1 + offset;
            if rows.len() <= index {
                rows.resize(index + 1, Vec::new());
            }
            rows[index] = row;
        }
        Ok(())
    }
}
