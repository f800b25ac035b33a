use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::constants::{default_symbols, DEFAULT_FETCH_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::errors::{Error, Result};
use crate::metrics::QuoteMetrics;
use crate::quotes::{normalize_symbol, PriceSource, Quote, QuoteStore};

/// Configuration for [`Poller`].
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Time between cycles. Zero falls back to [`DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Symbols fetched each cycle. An empty list disables polling.
    pub symbols: Vec<String>,
    /// Deadline the poller applies around each fetch, on top of the
    /// source's own timeout. Zero falls back to [`DEFAULT_FETCH_TIMEOUT`].
    pub fetch_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            symbols: default_symbols(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Drives periodic fetch/store cycles.
///
/// Exactly one poller writes to a store. Cycles never overlap: the next tick
/// is awaited only after the current fetch and append have finished. A failed
/// fetch or append is logged and the loop waits for the next tick; only
/// cancellation ends it.
pub struct Poller {
    source: Arc<dyn PriceSource>,
    store: Arc<dyn QuoteStore>,
    metrics: Arc<QuoteMetrics>,
    interval: Duration,
    symbols: Vec<String>,
    fetch_timeout: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn PriceSource>,
        store: Arc<dyn QuoteStore>,
        metrics: Arc<QuoteMetrics>,
        config: PollerConfig,
    ) -> Self {
        let mut symbols: Vec<String> = Vec::with_capacity(config.symbols.len());
        for symbol in config.symbols.iter().map(|s| normalize_symbol(s)) {
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        let fetch_timeout = if config.fetch_timeout.is_zero() {
            warn!("Invalid fetch timeout; using default {:?}", DEFAULT_FETCH_TIMEOUT);
            DEFAULT_FETCH_TIMEOUT
        } else {
            config.fetch_timeout
        };

        Self {
            source,
            store,
            metrics,
            interval: config.interval,
            symbols,
            fetch_timeout,
        }
    }

    /// Runs the polling loop until `cancel` fires.
    ///
    /// The first cycle starts immediately. Cancellation is observed while
    /// waiting for a tick and while a fetch is in flight; an append that has
    /// started always runs to completion.
    pub async fn poll(&self, cancel: CancellationToken) {
        if self.symbols.is_empty() {
            warn!("No symbols to poll");
            return;
        }

        let period = if self.interval.is_zero() {
            warn!("Invalid poll interval; using default {:?}", DEFAULT_POLL_INTERVAL);
            DEFAULT_POLL_INTERVAL
        } else {
            self.interval
        };

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Poller started for {} symbols ({}) every {:?}",
            self.symbols.len(),
            self.source.id(),
            period
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.metrics.record_poll_cycle();

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.fetch_quotes() => result,
            };

            let quotes = match fetched {
                Ok(quotes) => quotes,
                Err(e) => {
                    self.metrics.record_fetch_failure();
                    error!("Polling {} failed: {}", self.source.id(), e);
                    continue;
                }
            };
            debug!("Received {} quotes", quotes.len());

            match self.store_quotes(&quotes).await {
                Ok(count) => debug!("Stored {} quotes", count),
                Err(e) => error!("Updating quote history failed: {}", e),
            }
        }

        debug!("Stopping poller");
    }

    /// Runs a single fetch/store cycle and returns the number of quotes fetched.
    pub async fn run_cycle(&self) -> Result<usize> {
        let quotes = self.fetch_quotes().await.inspect_err(|_| {
            self.metrics.record_fetch_failure();
        })?;
        self.store_quotes(&quotes).await
    }

    async fn fetch_quotes(&self) -> Result<Vec<Quote>> {
        match timeout(self.fetch_timeout, self.source.fetch(&self.symbols)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Source(format!(
                "{} did not respond within {:?}",
                self.source.id(),
                self.fetch_timeout
            ))),
        }
    }

    async fn store_quotes(&self, quotes: &[Quote]) -> Result<usize> {
        self.store.append(quotes).await.inspect_err(|_| {
            self.metrics.record_store_failure();
        })?;
        Ok(quotes.len())
    }
}
