//! Quote management module.
//!
//! - [`model`] - The immutable `Quote` value and the `QuoteBatch` read shape
//! - [`store`] - The storage contract shared by the poller and the read API
//! - [`source`] - The price source contract consumed by the poller
//! - [`memory`] - Volatile, in-memory `QuoteStore` engine
//!
//! The durable engine lives in the `storage-sqlite` crate and the IEX Cloud
//! price source in the `market-data` crate.

pub mod memory;
pub mod model;
pub mod source;
pub mod store;

pub use memory::{MemoryQuoteStore, MemoryStoreConfig};
pub use model::{clamp_last, normalize_symbol, Quote, QuoteBatch};
pub use source::PriceSource;
pub use store::QuoteStore;
