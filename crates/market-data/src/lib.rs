//! Stonks Market Data Crate
//!
//! Price sources for the quote poller. Each provider implements
//! [`stonks_core::quotes::PriceSource`] and maps its own wire format onto
//! [`stonks_core::quotes::Quote`].
//!
//! # Providers
//!
//! - [`IexCloudProvider`] - IEX Cloud batch quote endpoint
//!
//! Provider failures surface as [`MarketDataError`] and convert into
//! `stonks_core::Error::Source` at the trait boundary.

pub mod errors;
pub mod provider;

pub use errors::MarketDataError;
pub use provider::iex_cloud::{IexCloudConfig, IexCloudProvider};
