//! Expenses table.
//!
//! Pivots shaped transactions into one row per day and one column per
//! category, each cell the sum of that day's signed amounts.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::aggregator::shaping::sheet_date;
use crate::types::ShapedTransaction;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpenseTable {
    categories: Vec<String>,
    days: BTreeMap<NaiveDate, BTreeMap<String, Decimal>>,
}

impl ExpenseTable {
    /// Build the table; categories and days come out sorted.
    pub fn tabulate(transactions: &[ShapedTransaction]) -> Self {
        let mut categories = BTreeSet::new();
        let mut days: BTreeMap<NaiveDate, BTreeMap<String, Decimal>> = BTreeMap::new();

        for txn in transactions {
            let category = txn.category.to_lowercase();
            *days
                .entry(txn.date)
                .or_default()
                .entry(category.clone())
                .or_default() += txn.amount;
            categories.insert(category);
        }

        Self {
            categories: categories.into_iter().collect(),
            days,
        }
    }

    /// Add columns for known categories with no spending yet.
    pub fn with_categories(mut self, names: &[String]) -> Self {
        let merged: BTreeSet<String> = self
            .categories
            .into_iter()
            .chain(names.iter().map(|n| n.to_lowercase()))
            .collect();
        self.categories = merged.into_iter().collect();
        self
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    /// Sum for one day and category, zero if nothing was spent.
    pub fn total(&self, day: NaiveDate, category: &str) -> Decimal {
        self.days
            .get(&day)
            .and_then(|c| c.get(&category.to_lowercase()))
            .copied()
            .unwrap_or_default()
    }

    /// `Date` followed by the title-cased category names.
    pub fn header(&self) -> Vec<Value> {
        std::iter::once("Date".to_string())
            .chain(self.categories.iter().map(|c| title_case(c)))
            .map(Value::String)
            .collect()
    }

    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.days
            .iter()
            .map(|(day, sums)| {
                let mut row = vec![Value::String(sheet_date(*day))];
                row.extend(self.categories.iter().map(|c| {
                    let sum = sums.get(c).copied().unwrap_or_default();
                    serde_json::to_value(sum).unwrap_or(Value::Null)
                }));
                row
            })
            .collect()
    }
}

fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
