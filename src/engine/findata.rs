//! Findata assembly.
//!
//! One entry per aggregator account under `"<institution>: <account>"`,
//! holding the absolute balance, plus the brokerage portfolio value.

use tracing::{info, warn};

use crate::types::{AccountSnapshot, AggregatorAccount, FinData, FinValue, PortfolioValue};

/// Build the findata mapping.
///
/// `accounts` is `None` when the aggregator fetch failed; the brokerage
/// value is still recorded. Duplicate labels keep the last account seen.
pub fn collect(
    accounts: Option<&[AggregatorAccount]>,
    brokerage_label: &str,
    portfolio: PortfolioValue,
) -> FinData {
    let mut findata = FinData::new();

    match accounts {
        Some(accounts) => {
            for snap in accounts.iter().map(AccountSnapshot::from) {
                let label = snap.label();
                if findata.insert(label.clone(), FinValue::Amount(snap.balance)).is_some() {
                    warn!(label = %label, "Duplicate account label, keeping last");
                }
            }
        }
        None => warn!("No aggregator accounts; findata has brokerage only"),
    }

    findata.insert(brokerage_label, portfolio.into());
    info!(entries = findata.len(), "Assembled findata");
    findata
}

/// Log each findata entry.
pub fn log_findata(findata: &FinData) {
    for (label, value) in findata.iter() {
        info!(label = %label, value = %value, "findata");
    }
}
