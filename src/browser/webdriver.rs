//! WebDriver-backed browser sessions.
//!
//! Connects to a running chromedriver (default `http://localhost:9515`)
//! and drives Chrome, headless unless configured otherwise.

use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::wd::TimeoutConfiguration;
use fantoccini::{Client, ClientBuilder, Locator};
use std::time::Duration;
use tracing::{debug, info};

use super::{BrowserError, BrowserLauncher, BrowserPage, Selector};
use crate::config::WebDriverConfig;

// ---------------------------------------------------------------------------
// Launcher
// ---------------------------------------------------------------------------

/// Starts Chrome sessions on a chromedriver endpoint.
pub struct ChromeLauncher {
    webdriver_url: String,
    headless: bool,
}

impl ChromeLauncher {
    pub fn new(cfg: &WebDriverConfig) -> Self {
        Self {
            webdriver_url: cfg.url.clone(),
            headless: cfg.headless,
        }
    }

    fn capabilities(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut args = vec!["--disable-gpu", "--window-size=1920,1080"];
        if self.headless {
            args.push("--headless");
        }

        let mut caps = serde_json::Map::new();
        caps.insert("browserName".into(), serde_json::json!("chrome"));
        caps.insert(
            "goog:chromeOptions".into(),
            serde_json::json!({ "args": args }),
        );
        caps
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        info!(url = %self.webdriver_url, headless = self.headless, "Creating webdriver session");

        let client = ClientBuilder::native()
            .capabilities(self.capabilities())
            .connect(&self.webdriver_url)
            .await
            .map_err(|e| BrowserError::Session(e.to_string()))?;

        Ok(Box::new(WebDriverPage { client }))
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

/// A page in a live WebDriver session.
pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    async fn element(&self, target: Selector) -> Result<fantoccini::elements::Element, BrowserError> {
        debug!(target = %target, "Locating element");
        // Locator has no by-name variant.
        let css;
        let locator = match target {
            Selector::Id(id) => Locator::Id(id),
            Selector::LinkText(text) => Locator::LinkText(text),
            Selector::Name(name) => {
                css = format!("[name=\"{name}\"]");
                Locator::Css(&css)
            }
        };

        self.client
            .find(locator)
            .await
            .map_err(|e| lookup_error(target, e))
    }
}

fn lookup_error(target: Selector, e: CmdError) -> BrowserError {
    if e.is_no_such_element() {
        BrowserError::ElementNotFound(target)
    } else {
        BrowserError::Command(e.to_string())
    }
}

fn command_error(e: CmdError) -> BrowserError {
    BrowserError::Command(e.to_string())
}

#[async_trait]
impl BrowserPage for WebDriverPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.client.goto(url).await.map_err(command_error)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let url = self.client.current_url().await.map_err(command_error)?;
        Ok(url.to_string())
    }

    async fn page_source(&self) -> Result<String, BrowserError> {
        self.client.source().await.map_err(command_error)
    }

    async fn find(&self, target: Selector) -> Result<(), BrowserError> {
        self.element(target).await.map(|_| ())
    }

    async fn click(&self, target: Selector) -> Result<(), BrowserError> {
        let element = self.element(target).await?;
        element.click().await.map_err(|e| lookup_error(target, e))
    }

    async fn send_keys(&self, target: Selector, text: &str) -> Result<(), BrowserError> {
        let element = self.element(target).await?;
        element.send_keys(text).await.map_err(|e| lookup_error(target, e))
    }

    async fn attribute(
        &self,
        target: Selector,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let element = self.element(target).await?;
        element.attr(name).await.map_err(|e| lookup_error(target, e))
    }

    async fn set_implicit_wait(&self, timeout: Duration) -> Result<(), BrowserError> {
        self.client
            .update_timeouts(TimeoutConfiguration::new(None, None, Some(timeout)))
            .await
            .map_err(command_error)
    }

    async fn cookies(&self) -> Result<Vec<(String, String)>, BrowserError> {
        let cookies = self.client.get_all_cookies().await.map_err(command_error)?;
        Ok(cookies
            .into_iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect())
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        info!("Quitting webdriver");
        self.client.clone().close().await.map_err(command_error)
    }
}
