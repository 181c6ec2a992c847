//! fintracker — daily net-worth snapshot.
//!
//! Entry point. Parses arguments, loads configuration, initialises
//! structured logging, signs in to the aggregator and runs the pipeline
//! once.

use anyhow::Result;
use clap::Parser;
use secrecy::SecretString;
use tracing::{info, warn};

use fintracker::aggregator::mint::MintClient;
use fintracker::browser::webdriver::ChromeLauncher;
use fintracker::brokerage::robinhood::RobinhoodClient;
use fintracker::cli::{self, Cli};
use fintracker::config::AppConfig;
use fintracker::engine::runner::{Alerting, RunOptions, Runner};
use fintracker::google::credentials::GoogleAuth;
use fintracker::google::gmail::GmailClient;
use fintracker::google::sheets::SheetsClient;

const BANNER: &str = r#"
  fintracker v0.1.0
  aggregator + brokerage → finances sheet
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args = Cli::parse();
    let cfg = AppConfig::load(&args.config)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %args.config,
        refresh = !args.no_refresh,
        expenses = args.expenses,
        "fintracker starting up"
    );

    // -- Credentials and clients -----------------------------------------

    let credentials = cli::resolve_credentials(
        args.email.clone(),
        args.password.clone(),
        cli::prompt_email,
        cli::prompt_password,
    )?;

    let auth = GoogleAuth::new(&cfg.google.credentials_dir)?;
    let gmail = GmailClient::new(auth.clone(), cfg.google.verification_subject.clone())?;
    let spreadsheet_id = AppConfig::resolve_env(&cfg.sheets.spreadsheet_id_env)?;
    let sheets = SheetsClient::new(auth, spreadsheet_id)?;

    let brokerage = RobinhoodClient::new(
        &cfg.brokerage.api_url,
        AppConfig::resolve_env(&cfg.brokerage.username_env)?,
        SecretString::new(AppConfig::resolve_env(&cfg.brokerage.password_env)?),
    )?;

    let alert_to = cfg
        .alerts
        .email_to_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok())
        .filter(|to| !to.is_empty());
    if alert_to.is_none() {
        warn!("No alert address configured; degraded runs will only be logged");
    }

    // -- Sign in ---------------------------------------------------------

    let launcher = ChromeLauncher::new(&cfg.webdriver);
    info!(webdriver = %cfg.webdriver.url, "Signing in to aggregator");
    let aggregator = MintClient::sign_in(&launcher, &gmail, &credentials, &cfg.aggregator).await?;

    // -- Run -------------------------------------------------------------

    let runner = Runner {
        brokerage: &brokerage,
        brokerage_label: &cfg.brokerage.label,
        sheets: &sheets,
        sheets_cfg: &cfg.sheets,
        alerts: alert_to.map(|to| Alerting { mailer: &gmail, to }),
    };
    let opts = RunOptions {
        refresh: !args.no_refresh,
        expenses: args.expenses,
        since: args.since,
    };

    let today = chrono::Local::now().date_naive();
    let report = runner.run(&aggregator, &opts, today).await?;

    info!(
        entries = report.findata.len(),
        row = ?report.finances_row,
        expense_days = ?report.expense_days,
        alert_sent = report.alert_sent,
        "Run complete"
    );
    Ok(())
}

/// Initialise the `tracing` subscriber.
///
/// JSON output when `FINTRACKER_LOG_JSON` is set; filter from `RUST_LOG`,
/// defaulting to `fintracker=info`.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("fintracker=info"));

    let json_logging = std::env::var("FINTRACKER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
