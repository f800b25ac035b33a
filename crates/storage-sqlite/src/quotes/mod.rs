//! SQLite-backed quote history.

mod model;
mod repository;

pub use model::{NewQuoteDB, QuoteDB};
pub use repository::{SqliteQuoteStore, SqliteStoreConfig, StartupMode, DEFAULT_DATABASE_FILE};
