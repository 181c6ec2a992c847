//! Account aggregator integration.
//!
//! Defines the `Aggregator` trait used by the run pipeline, plus:
//! - login — browser sign-in and MFA negotiation
//! - mint — Mint session client
//! - shaping — pure conversions for aggregator records

pub mod login;
pub mod mint;
pub mod shaping;

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::types::{AggregatorAccount, ShapedTransaction};

/// Options for a transaction fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub include_investment: bool,
    pub skip_duplicates: bool,
    pub remove_pending: bool,
    /// Only transactions on or after this date.
    pub start_date: Option<NaiveDate>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        Self {
            include_investment: false,
            skip_duplicates: false,
            remove_pending: true,
            start_date: None,
        }
    }
}

/// A signed-in aggregator session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Aggregator: Send + Sync {
    /// Ask the aggregator to re-poll linked institutions.
    async fn refresh_accounts(&self) -> Result<()>;

    async fn accounts(&self) -> Result<Vec<AggregatorAccount>>;

    async fn transactions(&self, query: &TransactionQuery) -> Result<Vec<ShapedTransaction>>;

    /// Names of the aggregator's spending categories.
    async fn categories(&self) -> Result<Vec<String>>;

    /// Log out and release the session.
    async fn close(&self) -> Result<()>;
}
