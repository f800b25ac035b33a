//! Quote storage traits.
//!
//! This module defines the storage interface shared by the poller (write path)
//! and the read API (read path). Two engines implement it: the in-memory
//! [`MemoryQuoteStore`](super::MemoryQuoteStore) and the SQLite-backed store in
//! the `storage-sqlite` crate. One engine is chosen at startup.
//!
//! # Design Notes
//!
//! - Writes are async: the durable engine hands them to a writer task
//! - Reads are sync, like the repository reads elsewhere in the workspace
//! - Recency is insertion order, never the quote timestamp
//! - The two engines deliberately differ under partial failure:
//!   the in-memory engine writes every tracked quote and reports the untracked
//!   ones in [`Error::UntrackedSymbols`](crate::Error::UntrackedSymbols); the
//!   SQLite engine writes the whole batch in one transaction or nothing

use async_trait::async_trait;

use super::model::{Quote, QuoteBatch};
use crate::errors::Result;

/// Storage interface for quote history.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// Appends quotes to the per-symbol history.
    ///
    /// Engines that scope writes to a tracked symbol set skip quotes for
    /// untracked symbols and return one combined error after processing the
    /// whole slice.
    async fn append(&self, quotes: &[Quote]) -> Result<()>;

    /// Returns the most recent quotes for `symbol`, newest first.
    ///
    /// `last` is clamped to at least 1. The result holds
    /// `min(last, stored)` quotes, or `Error::NotFound` when nothing is stored.
    fn query(&self, symbol: &str, last: i64) -> Result<Vec<Quote>>;

    /// Returns the most recent `last` quotes for each symbol in one retrieval.
    ///
    /// An empty `symbols` slice means the configured default set. Symbols
    /// without history are absent from the result; `Error::NotFound` is
    /// returned only when no symbol has any history.
    fn query_batch(&self, symbols: &[String], last: i64) -> Result<QuoteBatch>;

    /// The configured default symbol set.
    fn symbols(&self) -> Vec<String>;

    /// Releases underlying resources. Calling it again is a no-op.
    fn close(&self) -> Result<()>;
}
