//! SQLite storage implementation for Stonks.
//!
//! This crate is the only place in the workspace where Diesel dependencies
//! exist. It implements the `QuoteStore` trait from `stonks-core` on top of a
//! single SQLite file and contains:
//! - Database file preparation and connection pooling
//! - The single-writer actor that serialises write transactions
//! - The quote repository and its database models
//!
//! ```text
//!  poller ──append──► WriteHandle ──► writer connection ─┐
//!                                                        ├──► SQLite file (WAL)
//!  read API ──query──► r2d2 pool ──► reader connections ─┘
//! ```

pub mod db;
pub mod errors;
pub mod quotes;
pub mod schema;
pub mod utils;

pub use db::{create_pool, get_connection, init, DbConnection, DbPool, PoolSettings, WriteHandle};
pub use errors::{IntoCore, StorageError};
pub use quotes::{SqliteQuoteStore, SqliteStoreConfig, StartupMode};

pub use stonks_core::errors::{DatabaseError, Error, Result};
