//! Browser automation.
//!
//! Defines the `BrowserPage` and `BrowserLauncher` traits used by the
//! aggregator sign-in flow, and a WebDriver implementation:
//! - webdriver — chromedriver session over `fantoccini`

pub mod webdriver;

use async_trait::async_trait;
use std::time::Duration;

/// How to find an element on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Id(&'static str),
    LinkText(&'static str),
    Name(&'static str),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Selector::Id(s) => write!(f, "#{s}"),
            Selector::LinkText(s) => write!(f, "link \"{s}\""),
            Selector::Name(s) => write!(f, "[name={s}]"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrowserError {
    #[error("Element not found: {0}")]
    ElementNotFound(Selector),

    #[error("Could not start browser session: {0}")]
    Session(String),

    #[error("Browser command failed: {0}")]
    Command(String),
}

/// A live page in a browser session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrowserPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Rendered HTML of the current page.
    async fn page_source(&self) -> Result<String, BrowserError>;

    /// Succeeds once the element is present, within the implicit wait.
    async fn find(&self, target: Selector) -> Result<(), BrowserError>;

    async fn click(&self, target: Selector) -> Result<(), BrowserError>;

    async fn send_keys(&self, target: Selector, text: &str) -> Result<(), BrowserError>;

    async fn attribute(&self, target: Selector, name: &str)
        -> Result<Option<String>, BrowserError>;

    /// Wait up to `timeout` whenever an element lookup misses.
    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), BrowserError>;

    /// Session cookies as `(name, value)` pairs.
    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError>;

    /// End the session. The page must not be used afterwards.
    async fn quit(&self) -> Result<(), BrowserError>;
}

/// Opens new browser sessions.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserPage>, BrowserError>;
}
