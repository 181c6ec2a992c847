//! Command-line arguments and credential resolution.
//!
//! Aggregator credentials come from the positional arguments, then the
//! `MINT_USER` / `MINT_PASS` environment variables, then a prompt.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use secrecy::SecretString;
use std::io::{self, BufRead, Write};

use crate::aggregator::login::Credentials;

#[derive(Parser, Debug)]
#[command(
    name = "fintracker",
    version,
    about = "Record account balances and brokerage equity in a Google Sheet"
)]
pub struct Cli {
    /// The e-mail address for your Mint account
    #[arg(env = "MINT_USER")]
    pub email: Option<String>,

    /// The password for your Mint account
    #[arg(env = "MINT_PASS", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    /// Also rewrite the expenses sheet from recent transactions
    #[arg(long)]
    pub expenses: bool,

    /// Earliest transaction date for the expenses sheet (YYYY-MM-DD)
    #[arg(long, requires = "expenses")]
    pub since: Option<NaiveDate>,

    /// Skip asking the aggregator to refresh linked institutions
    #[arg(long)]
    pub no_refresh: bool,
}

/// Fill in missing credentials from the prompts. Empty values count as
/// missing.
pub fn resolve_credentials<E, P>(
    email: Option<String>,
    password: Option<String>,
    prompt_email: E,
    prompt_password: P,
) -> Result<Credentials>
where
    E: FnOnce() -> Result<String>,
    P: FnOnce() -> Result<String>,
{
    let email = match email.filter(|e| !e.is_empty()) {
        Some(e) => e,
        None => prompt_email()?,
    };
    let password = match password.filter(|p| !p.is_empty()) {
        Some(p) => p,
        None => prompt_password()?,
    };

    Ok(Credentials {
        email: email.trim().to_string(),
        password: SecretString::new(password),
    })
}

/// Visible prompt on stdin.
pub fn prompt_email() -> Result<String> {
    print!("Mint e-mail: ");
    io::stdout().flush().context("Failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read e-mail from stdin")?;
    Ok(line.trim().to_string())
}

/// Masked prompt.
pub fn prompt_password() -> Result<String> {
    rpassword::prompt_password("Mint password: ").context("Failed to read password")
}
