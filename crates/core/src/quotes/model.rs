//! Quote domain models.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of an instrument's price at a point in time.
///
/// Quotes are never mutated once created; stores only append new ones.
/// The symbol is always held in lowercase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub symbol: String,
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: impl AsRef<str>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            price,
            symbol: normalize_symbol(symbol.as_ref()),
            timestamp,
        }
    }

    /// The quote's timestamp in the host's local time zone.
    pub fn local_time(&self) -> DateTime<Local> {
        self.timestamp.with_timezone(&Local)
    }
}

/// Batch read result: symbol to quotes, newest first.
pub type QuoteBatch = HashMap<String, Vec<Quote>>;

/// Canonical form of a symbol.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_lowercase()
}

/// Clamps a requested quote count to at least one.
pub fn clamp_last(last: i64) -> usize {
    if last < 1 {
        1
    } else {
        usize::try_from(last).unwrap_or(usize::MAX)
    }
}
