//! Periodic quote polling.
//!
//! The [`Poller`] owns the ingestion loop: fetch current quotes from a
//! [`PriceSource`](crate::quotes::PriceSource), append them to a
//! [`QuoteStore`](crate::quotes::QuoteStore), wait for the next tick, repeat
//! until cancelled.

mod poller;


pub use poller::{Poller, PollerConfig};
