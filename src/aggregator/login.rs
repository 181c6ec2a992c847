//! Aggregator sign-in.
//!
//! Submits credentials through the browser, then polls the rendered page
//! until the overview URL is reached, answering an email MFA challenge
//! along the way. Page states are recognised by substrings of the HTML,
//! so any markup change on the aggregator side shows up here first.

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{BrowserError, BrowserLauncher, BrowserPage, Selector};
use crate::config::AggregatorConfig;
use crate::types::TrackerError;

// ---------------------------------------------------------------------------
// Page landmarks
// ---------------------------------------------------------------------------

const LOGIN_LINK: Selector = Selector::LinkText("Log In");
const USER_INPUT: Selector = Selector::Id("ius-userid");
const PASSWORD_INPUT: Selector = Selector::Id("ius-password");
const SIGN_IN_BUTTON: Selector = Selector::Id("ius-sign-in-submit-btn");
const MFA_EMAIL_OPTION: Selector = Selector::Id("ius-mfa-option-email");
const MFA_OPTIONS_SUBMIT: Selector = Selector::Id("ius-mfa-options-submit-btn");
const MFA_CODE_INPUT: Selector = Selector::Id("ius-mfa-confirm-code");
const MFA_CODE_SUBMIT: Selector = Selector::Id("ius-mfa-otp-submit-btn");
const TRANSACTIONS_TAB: Selector = Selector::Id("transaction");

const TEXT_LOGIN_FAILED: &str = "Hmm. That didn't work.";
const TEXT_CHECK_EMAIL: &str = "Check your email";
const TEXT_CHALLENGE: &str = "Let's make sure it's you";
const TEXT_SIGNING_IN: &str = "Signing In ...";

pub const EXCEPTION_PAGE: &str = "exceptionpage.html";
pub const UNHANDLED_PAGE: &str = "unhandledheadlesspage.html";

const LOGIN_FORM_WAIT: Duration = Duration::from_secs(20);
const OVERVIEW_WAIT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Aggregator login credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

/// Source of the emailed MFA verification code.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VerificationCodeSource: Send + Sync {
    async fn latest_code(&self) -> Result<String>;
}

/// Timing and location knobs for the sign-in flow.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub home_url: String,
    pub overview_url_prefix: String,
    pub poll_interval: Duration,
    pub email_wait: Duration,
    pub max_polls: Option<u32>,
    pub dump_dir: PathBuf,
}

impl From<&AggregatorConfig> for LoginSettings {
    fn from(cfg: &AggregatorConfig) -> Self {
        Self {
            home_url: cfg.home_url.clone(),
            overview_url_prefix: cfg.overview_url_prefix.clone(),
            poll_interval: cfg.poll_interval(),
            email_wait: cfg.email_wait(),
            max_polls: cfg.max_login_polls,
            dump_dir: cfg.dump_dir.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Page classification
// ---------------------------------------------------------------------------

/// What the sign-in page is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPage {
    Failed,
    /// The code email was requested and the code form is up.
    AwaitingCode,
    Challenge,
    SigningIn,
    Unrecognized,
}

/// Classify rendered HTML. The code form only counts once the email
/// option has been chosen by us.
pub fn classify_page(source: &str, email_sent: bool) -> LoginPage {
    if source.contains(TEXT_LOGIN_FAILED) {
        LoginPage::Failed
    } else if source.contains(TEXT_CHECK_EMAIL) && email_sent {
        LoginPage::AwaitingCode
    } else if source.contains(TEXT_CHALLENGE) {
        LoginPage::Challenge
    } else if source.contains(TEXT_SIGNING_IN) {
        LoginPage::SigningIn
    } else {
        LoginPage::Unrecognized
    }
}

// ---------------------------------------------------------------------------
// Flow
// ---------------------------------------------------------------------------

/// Open the login form and submit credentials.
pub async fn submit_credentials(
    page: &dyn BrowserPage,
    settings: &LoginSettings,
    credentials: &Credentials,
) -> Result<(), BrowserError> {
    info!(url = %settings.home_url, "Navigating to aggregator");
    page.goto(&settings.home_url).await?;
    page.set_implicit_wait(LOGIN_FORM_WAIT).await?;

    debug!("Clicking Log In");
    page.click(LOGIN_LINK).await?;
    debug!("Sending user");
    page.send_keys(USER_INPUT, &credentials.email).await?;
    debug!("Sending password");
    page.send_keys(PASSWORD_INPUT, credentials.password.expose_secret())
        .await?;
    debug!("Submitting");
    page.click(SIGN_IN_BUTTON).await
}

/// Sign in and return a page sitting on the aggregator overview.
///
/// Sessions whose login form is missing an element are dumped and
/// discarded, and a fresh session is started; this retry is unbounded.
pub async fn sign_in(
    launcher: &dyn BrowserLauncher,
    codes: &dyn VerificationCodeSource,
    credentials: &Credentials,
    settings: &LoginSettings,
) -> Result<Box<dyn BrowserPage>> {
    let page = loop {
        let page = launcher.launch().await?;
        match submit_credentials(page.as_ref(), settings, credentials).await {
            Ok(()) => break page,
            Err(BrowserError::ElementNotFound(target)) => {
                warn!(target = %target, "Login form element missing, restarting session");
                dump_page(page.as_ref(), &settings.dump_dir, EXCEPTION_PAGE).await;
                quit_quietly(page.as_ref()).await;
            }
            Err(e) => {
                quit_quietly(page.as_ref()).await;
                return Err(e.into());
            }
        }
    };

    match await_overview(page.as_ref(), codes, settings).await {
        Ok(()) => Ok(page),
        Err(e) => {
            quit_quietly(page.as_ref()).await;
            Err(e)
        }
    }
}

/// Poll until the overview URL is reached, then wait for the page to load.
async fn await_overview(
    page: &dyn BrowserPage,
    codes: &dyn VerificationCodeSource,
    settings: &LoginSettings,
) -> Result<()> {
    let mut email_sent = false;
    let mut polls: u32 = 0;

    loop {
        let url = page.current_url().await?;
        if url.starts_with(&settings.overview_url_prefix) {
            break;
        }

        if let Some(max) = settings.max_polls {
            if polls >= max {
                return Err(TrackerError::LoginTimedOut(max).into());
            }
        }
        polls += 1;

        let source = page.page_source().await?;
        match classify_page(&source, email_sent) {
            LoginPage::Failed => {
                warn!("Aggregator login failed");
            }
            LoginPage::AwaitingCode => {
                info!(
                    wait_secs = settings.email_wait.as_secs(),
                    "Waiting for verification email"
                );
                tokio::time::sleep(settings.email_wait).await;
                let code = codes.latest_code().await?;
                info!(code = %code, "Got verification code");
                page.send_keys(MFA_CODE_INPUT, &code).await?;
                page.click(MFA_CODE_SUBMIT).await?;
                debug!("Submitted verification code");
            }
            LoginPage::Challenge => {
                info!("MFA challenge presented, choosing email");
                page.click(MFA_EMAIL_OPTION).await?;
                page.click(MFA_OPTIONS_SUBMIT).await?;
                email_sent = true;
            }
            LoginPage::SigningIn => {
                debug!("Signing in...");
            }
            LoginPage::Unrecognized => {
                warn!(url = %url, "Unhandled login page");
                dump_page(page, &settings.dump_dir, UNHANDLED_PAGE).await;
            }
        }

        tokio::time::sleep(settings.poll_interval).await;
    }

    // The overview can take a while to render.
    page.set_implicit_wait(OVERVIEW_WAIT).await?;
    page.find(TRANSACTIONS_TAB).await?;
    info!(polls, "Signed in to aggregator");
    Ok(())
}

/// Save the current page source for later inspection. Failures are logged.
pub async fn dump_page(page: &dyn BrowserPage, dir: &Path, file_name: &str) {
    let path = dir.join(file_name);
    let result = async {
        let source = page.page_source().await?;
        tokio::fs::create_dir_all(dir).await?;
        tokio::fs::write(&path, source).await?;
        anyhow::Ok(())
    }
    .await;

    match result {
        Ok(()) => info!(path = %path.display(), "Saved page source"),
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to save page source"),
    }
}

async fn quit_quietly(page: &dyn BrowserPage) {
    if let Err(e) = page.quit().await {
        warn!(error = %e, "Failed to quit webdriver");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
