//! Sign-in flow against scripted browser pages.

use std::path::PathBuf;
use std::time::Duration;

use fintracker::aggregator::login::{self, Credentials, LoginSettings, EXCEPTION_PAGE};
use fintracker::aggregator::mint::MintClient;
use fintracker::browser::Selector;
use fintracker::types::TrackerError;
use secrecy::SecretString;

use crate::fakes::{entries, journal, FakeLauncher, FakePage, FixedCode, Screen};

const HOME: &str = "https://www.mint.com";
const LOGIN: &str = "https://accounts.intuit.com/index.html";
const OVERVIEW: &str = "https://mint.intuit.com/overview.event";

fn settings(max_polls: u32) -> LoginSettings {
    LoginSettings {
        home_url: HOME.into(),
        overview_url_prefix: OVERVIEW.into(),
        poll_interval: Duration::ZERO,
        email_wait: Duration::ZERO,
        max_polls: Some(max_polls),
        dump_dir: temp_dir(),
    }
}

fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("fintracker_login_{}", uuid::Uuid::new_v4()))
}

fn credentials() -> Credentials {
    Credentials {
        email: "me@example.com".into(),
        password: SecretString::new("hunter2".into()),
    }
}

fn overview() -> Screen {
    Screen::new(
        &format!("{OVERVIEW}?task=L"),
        r#"<div id="transaction">Transactions</div>"#,
    )
}

#[tokio::test]
async fn test_email_challenge_then_overview() {
    let log = journal();
    let page = FakePage::new(1, Screen::new(HOME, "<a>Log In</a>"), log.clone())
        .on_click(
            Selector::Id("ius-sign-in-submit-btn"),
            Screen::new(LOGIN, "<h1>Let's make sure it's you</h1>"),
        )
        .on_click(
            Selector::Id("ius-mfa-options-submit-btn"),
            Screen::new(LOGIN, "<h1>Check your email</h1><h1>Let's make sure it's you</h1>"),
        )
        .on_click(Selector::Id("ius-mfa-otp-submit-btn"), overview());

    let launcher = FakeLauncher::new(vec![page]);
    let codes = FixedCode::new("482913");

    let page = login::sign_in(&launcher, &codes, &credentials(), &settings(10))
        .await
        .unwrap();
    assert!(page.current_url().await.unwrap().starts_with(OVERVIEW));
    assert_eq!(*codes.calls.lock().unwrap(), 1);

    let log = entries(&log);
    let expected = [
        format!("page1: goto {HOME}"),
        "page1: wait 20s".to_string(),
        "page1: click link \"Log In\"".to_string(),
        "page1: keys #ius-userid=me@example.com".to_string(),
        "page1: keys #ius-password=hunter2".to_string(),
        "page1: click #ius-sign-in-submit-btn".to_string(),
        "page1: click #ius-mfa-option-email".to_string(),
        "page1: click #ius-mfa-options-submit-btn".to_string(),
        "page1: keys #ius-mfa-confirm-code=482913".to_string(),
        "page1: click #ius-mfa-otp-submit-btn".to_string(),
        "page1: wait 60s".to_string(),
    ];
    assert_eq!(log, expected);
}

#[tokio::test]
async fn test_missing_element_restarts_session() {
    let log = journal();
    let broken = FakePage::new(1, Screen::new(HOME, "<p>maintenance</p>"), log.clone())
        .without(Selector::Id("ius-userid"));
    let working = FakePage::new(2, Screen::new(HOME, "<a>Log In</a>"), log.clone())
        .on_click(Selector::Id("ius-sign-in-submit-btn"), overview());

    let launcher = FakeLauncher::new(vec![broken, working]);
    let codes = FixedCode::new("unused");
    let settings = settings(5);

    let page = login::sign_in(&launcher, &codes, &credentials(), &settings)
        .await
        .unwrap();
    assert!(page.current_url().await.unwrap().starts_with(OVERVIEW));

    let log = entries(&log);
    assert!(log.contains(&"page1: quit".to_string()));
    assert!(!log.contains(&"page2: quit".to_string()));
    assert_eq!(*codes.calls.lock().unwrap(), 0);

    let dumped = std::fs::read_to_string(settings.dump_dir.join(EXCEPTION_PAGE)).unwrap();
    assert_eq!(dumped, "<p>maintenance</p>");
    let _ = std::fs::remove_dir_all(&settings.dump_dir);
}

#[tokio::test]
async fn test_poll_limit_quits_session() {
    let log = journal();
    let page = FakePage::new(1, Screen::new(HOME, "<a>Log In</a>"), log.clone()).on_click(
        Selector::Id("ius-sign-in-submit-btn"),
        Screen::new(LOGIN, "<p>Hmm. That didn't work.</p>"),
    );

    let launcher = FakeLauncher::new(vec![page]);
    let codes = FixedCode::new("unused");

    let err = login::sign_in(&launcher, &codes, &credentials(), &settings(3))
        .await
        .err()
        .unwrap();
    assert!(matches!(
        err.downcast_ref::<TrackerError>(),
        Some(TrackerError::LoginTimedOut(3))
    ));
    assert_eq!(entries(&log).last().map(String::as_str), Some("page1: quit"));
}

#[tokio::test]
async fn test_check_email_ignored_until_option_chosen() {
    let log = journal();
    let page = FakePage::new(1, Screen::new(HOME, "<a>Log In</a>"), log.clone()).on_click(
        Selector::Id("ius-sign-in-submit-btn"),
        Screen::new(LOGIN, "<h1>Check your email</h1>"),
    );

    let launcher = FakeLauncher::new(vec![page]);
    let codes = FixedCode::new("000000");
    let settings = settings(2);

    assert!(login::sign_in(&launcher, &codes, &credentials(), &settings)
        .await
        .is_err());
    assert_eq!(*codes.calls.lock().unwrap(), 0);
    assert!(settings.dump_dir.join(login::UNHANDLED_PAGE).exists());
    let _ = std::fs::remove_dir_all(&settings.dump_dir);
}

#[tokio::test]
async fn test_attach_reads_token_and_closes() {
    let log = journal();
    let page = FakePage::new(1, overview(), log.clone());

    let client = MintClient::attach(Box::new(page), "https://mint.intuit.com")
        .await
        .unwrap();
    client.close().await.unwrap();

    let log = entries(&log);
    assert!(log.contains(&"page1: click #link-logout".to_string()));
    assert_eq!(log.last().map(String::as_str), Some("page1: quit"));
}
