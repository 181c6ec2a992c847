//! fintracker — aggregator balances and brokerage equity into a spreadsheet.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod cli;
pub mod browser;
pub mod aggregator;
pub mod google;
pub mod brokerage;
pub mod engine;
