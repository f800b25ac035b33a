//! Stonks Core - quote model, storage contract and polling.
//!
//! This crate contains the storage-agnostic parts of the quote pipeline.
//! It defines the traits that the `storage-sqlite` and `market-data` crates
//! implement, plus the in-memory store and the poller that drives them.
//!
//! ```text
//! Poller ──fetch──► PriceSource (market-data)
//!    │
//!    └──append──► QuoteStore ◄──query── read API (server)
//!                   ├─ MemoryQuoteStore (this crate)
//!                   └─ SqliteQuoteStore (storage-sqlite)
//! ```

pub mod constants;
pub mod errors;
pub mod metrics;
pub mod poll;
pub mod quotes;

pub use errors::{DatabaseError, Error, Result};
pub use crate::metrics::{InFlightRequest, MetricsSnapshot, QuoteMetrics};
