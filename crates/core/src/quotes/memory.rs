//! Volatile, in-memory quote store.
//!
//! History lives only as long as the process. Each tracked symbol maps to a
//! newest-first deque; new quotes are pushed to the front so reads never sort.
//! A single `RwLock` guards the whole map: readers share it, the writer
//! excludes everyone.
//!
//! Writes are scoped to the configured symbol set. A quote for any other
//! symbol is skipped, and all skipped symbols are reported together after the
//! batch, while quotes for tracked symbols are kept. This engine is the
//! partial-failure-tolerant one; the SQLite engine is all-or-nothing.

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::model::{clamp_last, normalize_symbol, Quote, QuoteBatch};
use super::store::QuoteStore;
use crate::constants::default_symbols;
use crate::errors::{Error, Result};
use crate::metrics::QuoteMetrics;

type History = HashMap<String, VecDeque<Quote>>;

/// Configuration for [`MemoryQuoteStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Tracked symbols. Defaults to [`DEFAULT_SYMBOLS`](crate::constants::DEFAULT_SYMBOLS).
    pub symbols: Vec<String>,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
        }
    }
}

/// In-memory [`QuoteStore`] engine.
pub struct MemoryQuoteStore {
    // `None` once the store is closed.
    quotes: RwLock<Option<History>>,
    symbols: Vec<String>,
    metrics: Arc<QuoteMetrics>,
}

impl MemoryQuoteStore {
    pub fn new(config: MemoryStoreConfig, metrics: Arc<QuoteMetrics>) -> Result<Self> {
        let mut symbols: Vec<String> = Vec::with_capacity(config.symbols.len());
        for symbol in &config.symbols {
            let symbol = normalize_symbol(symbol);
            if symbol.is_empty() {
                return Err(Error::InvalidConfigValue(
                    "tracked symbols must not be blank".to_string(),
                ));
            }
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }
        if symbols.is_empty() {
            return Err(Error::InvalidConfigValue(
                "at least one tracked symbol is required".to_string(),
            ));
        }

        let history: History = symbols
            .iter()
            .map(|symbol| (symbol.clone(), VecDeque::new()))
            .collect();

        Ok(Self {
            quotes: RwLock::new(Some(history)),
            symbols,
            metrics,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<History>>> {
        self.quotes
            .read()
            .map_err(|_| Error::Unexpected("quote store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<History>>> {
        self.quotes
            .write()
            .map_err(|_| Error::Unexpected("quote store lock poisoned".to_string()))
    }
}

/// Copies up to `last` quotes from the front of a newest-first history.
fn newest(history: &VecDeque<Quote>, last: usize) -> Vec<Quote> {
    history.iter().take(last).cloned().collect()
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    async fn append(&self, quotes: &[Quote]) -> Result<()> {
        let mut guard = self.write()?;
        let history = guard.as_mut().ok_or(Error::Closed)?;

        let mut rejected: Vec<String> = Vec::new();
        let mut appended = 0usize;
        for quote in quotes {
            let symbol = normalize_symbol(&quote.symbol);
            match history.get_mut(&symbol) {
                Some(entries) => {
                    let mut stored = quote.clone();
                    stored.symbol = symbol;
                    entries.push_front(stored);
                    appended += 1;
                }
                None => rejected.push(symbol),
            }
        }
        drop(guard);

        self.metrics.record_appended(appended);
        debug!("Appended {} quotes in memory", appended);

        if rejected.is_empty() {
            Ok(())
        } else {
            self.metrics.record_rejected(rejected.len());
            warn!("Rejected quotes for untracked symbols: {:?}", rejected);
            Err(Error::UntrackedSymbols(rejected))
        }
    }

    fn query(&self, symbol: &str, last: i64) -> Result<Vec<Quote>> {
        self.metrics.record_read();
        let guard = self.read()?;
        let history = guard.as_ref().ok_or(Error::Closed)?;

        let symbol = normalize_symbol(symbol);
        match history.get(&symbol) {
            Some(entries) if !entries.is_empty() => Ok(newest(entries, clamp_last(last))),
            _ => Err(Error::NotFound(symbol)),
        }
    }

    fn query_batch(&self, symbols: &[String], last: i64) -> Result<QuoteBatch> {
        self.metrics.record_read();
        let guard = self.read()?;
        let history = guard.as_ref().ok_or(Error::Closed)?;

        let requested: &[String] = if symbols.is_empty() {
            &self.symbols
        } else {
            symbols
        };
        let last = clamp_last(last);

        let mut batch = QuoteBatch::new();
        for symbol in requested {
            let symbol = normalize_symbol(symbol);
            if let Some(entries) = history.get(&symbol) {
                if !entries.is_empty() {
                    batch.insert(symbol, newest(entries, last));
                }
            }
        }

        if batch.is_empty() {
            return Err(Error::NotFound(requested.join(", ")));
        }
        Ok(batch)
    }

    fn symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.write()?;
        if guard.take().is_some() {
            debug!("Closed in-memory quote store");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn store_with(symbols: &[&str]) -> MemoryQuoteStore {
        let config = MemoryStoreConfig {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        };
        MemoryQuoteStore::new(config, Arc::new(QuoteMetrics::new())).unwrap()
    }

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote::new(symbol, price, Utc::now())
    }

    #[test]
    fn test_new_tracks_default_symbols() {
        let store =
            MemoryQuoteStore::new(MemoryStoreConfig::default(), Arc::new(QuoteMetrics::new()))
                .unwrap();
        assert_eq!(store.symbols(), default_symbols());
    }

    #[test]
    fn test_new_normalizes_and_dedupes_symbols() {
        let store = store_with(&["FOO", "bar", "foo"]);
        assert_eq!(store.symbols(), vec!["foo".to_string(), "bar".to_string()]);
    }

    #[test]
    fn test_new_rejects_empty_symbol_set() {
        let result = MemoryQuoteStore::new(
            MemoryStoreConfig { symbols: vec![] },
            Arc::new(QuoteMetrics::new()),
        );
        assert!(matches!(result, Err(Error::InvalidConfigValue(_))));
    }

    #[tokio::test]
    async fn test_query_returns_last_appended_when_last_is_zero() {
        let store = store_with(&["fb"]);
        store
            .append(&[quote("fb", 123.45), quote("fb", 123.42)])
            .await
            .unwrap();

        let actual = store.query("fb", 0).unwrap();
        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].price, 123.42);
        assert_eq!(actual[0].symbol, "fb");
    }

    #[tokio::test]
    async fn test_query_is_newest_first_and_bounded() {
        let store = store_with(&["fb"]);
        for i in 0..5 {
            store.append(&[quote("fb", i as f64)]).await.unwrap();
        }

        let actual = store.query("FB", 3).unwrap();
        let prices: Vec<f64> = actual.iter().map(|q| q.price).collect();
        assert_eq!(prices, vec![4.0, 3.0, 2.0]);

        let all = store.query("fb", 100).unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_recency_ignores_timestamps() {
        let store = store_with(&["fb"]);
        let now = Utc::now();
        store.append(&[Quote::new("fb", 1.0, now)]).await.unwrap();
        store.append(&[Quote::new("fb", 2.0, now - Duration::hours(1))]).await.unwrap();

        let actual = store.query("fb", 1).unwrap();
        assert_eq!(actual[0].price, 2.0);
    }

    #[tokio::test]
    async fn test_query_unknown_or_empty_symbol_is_not_found() {
        let store = store_with(&["fb"]);
        assert!(matches!(store.query("fb", 1), Err(Error::NotFound(_))));
        assert!(matches!(store.query("aapl", 1), Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_append_untracked_symbol_keeps_tracked_quotes() {
        let store = store_with(&["fb"]);
        let err = store
            .append(&[quote("aapl", 1.0), quote("fb", 2.0), quote("TSLA", 3.0)])
            .await
            .unwrap_err();

        match err {
            Error::UntrackedSymbols(symbols) => {
                assert_eq!(symbols, vec!["aapl".to_string(), "tsla".to_string()])
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let actual = store.query("fb", 1).unwrap();
        assert_eq!(actual[0].price, 2.0);
        assert!(store.query("aapl", 1).is_err());
    }

    #[tokio::test]
    async fn test_query_returns_copy() {
        let store = store_with(&["fb"]);
        store.append(&[quote("fb", 1.0)]).await.unwrap();

        let mut actual = store.query("fb", 1).unwrap();
        actual[0].price = 999.0;
        actual.clear();

        assert_eq!(store.query("fb", 1).unwrap()[0].price, 1.0);
    }

    #[tokio::test]
    async fn test_query_batch_top_n_per_symbol() {
        let store = store_with(&["fb", "goog"]);
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        store
            .append(&[
                Quote::new("fb", 123.45, ts),
                Quote::new("fb", 123.42, ts),
                Quote::new("fb", 123.40, ts),
                Quote::new("goog", 234.56, ts),
                Quote::new("goog", 234.51, ts),
            ])
            .await
            .unwrap();

        let batch = store
            .query_batch(&["fb".to_string(), "goog".to_string()], 2)
            .unwrap();
        assert_eq!(batch.len(), 2);
        let fb: Vec<f64> = batch["fb"].iter().map(|q| q.price).collect();
        let goog: Vec<f64> = batch["goog"].iter().map(|q| q.price).collect();
        assert_eq!(fb, vec![123.40, 123.42]);
        assert_eq!(goog, vec![234.51, 234.56]);
    }

    #[tokio::test]
    async fn test_query_batch_partial_and_empty() {
        let store = store_with(&["fb", "goog"]);
        let symbols = vec!["fb".to_string(), "goog".to_string()];
        assert!(matches!(
            store.query_batch(&symbols, 1),
            Err(Error::NotFound(_))
        ));

        store.append(&[quote("fb", 1.0)]).await.unwrap();
        let batch = store.query_batch(&symbols, 1).unwrap();
        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key("fb"));
    }

    #[tokio::test]
    async fn test_query_batch_empty_request_uses_default_set() {
        let store = store_with(&["fb", "goog"]);
        store
            .append(&[quote("fb", 1.0), quote("goog", 2.0)])
            .await
            .unwrap();

        let batch = store.query_batch(&[], 0).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch["goog"].len(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_use() {
        let store = store_with(&["fb"]);
        store.close().unwrap();
        store.close().unwrap();

        assert!(matches!(store.query("fb", 1), Err(Error::Closed)));
        assert!(matches!(
            store.append(&[quote("fb", 1.0)]).await,
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_readers_during_writes() {
        let store = Arc::new(store_with(&["fb"]));
        store.append(&[quote("fb", 0.0)]).await.unwrap();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            readers.push(tokio::spawn(async move {
                for _ in 0..200 {
                    let quotes = store.query("fb", 3).unwrap();
                    assert!(!quotes.is_empty() && quotes.len() <= 3);
                    for pair in quotes.windows(2) {
                        assert!(pair[0].price > pair[1].price);
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for i in 1..=200 {
            store.append(&[quote("fb", i as f64)]).await.unwrap();
        }
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(store.query("fb", 1).unwrap()[0].price, 200.0);
    }
}
