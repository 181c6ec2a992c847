//! Brokerage integrations.
//!
//! Defines the `Brokerage` trait and the Robinhood implementation.

pub mod robinhood;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::PortfolioValue;

/// A brokerage account whose portfolio value is tracked.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Brokerage: Send + Sync {
    /// Current portfolio equity.
    ///
    /// A rejected login is `Ok(PortfolioValue::BadLogin)`, not an error.
    async fn portfolio_value(&self) -> Result<PortfolioValue>;

    /// Name for logging and the findata label.
    fn name(&self) -> &str;
}
