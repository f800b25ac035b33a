use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use stonks_core::quotes::{normalize_symbol, Quote};

use crate::errors::MarketDataError;

/// A single quote entry of the batch response.
#[derive(Debug, Deserialize)]
pub(crate) struct IexQuote {
    pub symbol: String,
    #[serde(rename = "latestPrice")]
    pub price: f64,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "latestUpdate")]
    pub timestamp_ms: i64,
}

/// Batch response keyed by symbol, then by data type (`"quote"`).
pub(crate) type BatchResponse = HashMap<String, HashMap<String, IexQuote>>;

/// Maps a batch response onto core quotes.
///
/// Fails as a whole when any symbol lacks its `quote` entry or carries an
/// unrepresentable timestamp.
pub(crate) fn into_quotes(batch: BatchResponse) -> Result<Vec<Quote>, MarketDataError> {
    let mut quotes = Vec::with_capacity(batch.len());

    for (symbol, mut types) in batch {
        let quote = types
            .remove("quote")
            .ok_or(MarketDataError::MissingQuote(symbol))?;

        let timestamp = Utc
            .timestamp_millis_opt(quote.timestamp_ms)
            .single()
            .ok_or_else(|| {
                MarketDataError::Decode(format!(
                    "invalid latestUpdate {} for symbol '{}'",
                    quote.timestamp_ms, quote.symbol
                ))
            })?;

        quotes.push(Quote::new(&quote.symbol, quote.price, timestamp));
    }

    Ok(quotes)
}

/// Checks that every requested symbol came back.
///
/// The batch endpoint silently drops symbols it does not know, so a short
/// response is the only signal of an unresolvable symbol.
pub(crate) fn ensure_complete(
    requested: &[String],
    quotes: &[Quote],
) -> Result<(), MarketDataError> {
    match requested
        .iter()
        .map(|s| normalize_symbol(s))
        .find(|symbol| !quotes.iter().any(|q| &q.symbol == symbol))
    {
        Some(missing) => Err(MarketDataError::MissingQuote(missing)),
        None => Ok(()),
    }
}
