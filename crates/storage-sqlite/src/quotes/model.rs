//! Database models for quotes.

use diesel::prelude::*;
use stonks_core::quotes::{normalize_symbol, Quote};

use crate::errors::StorageError;
use crate::utils::{format_timestamp, parse_timestamp};

/// A stored quote row.
///
/// Also loaded by name from the ranked batch query, whose extra `rn` column
/// is ignored.
#[derive(Queryable, Selectable, QueryableByName, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::quotes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct QuoteDB {
    pub id: i64,
    pub symbol: String,
    pub price: f64,
    pub datetime: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::quotes)]
pub struct NewQuoteDB {
    pub symbol: String,
    pub price: f64,
    pub datetime: String,
}

impl From<&Quote> for NewQuoteDB {
    fn from(quote: &Quote) -> Self {
        Self {
            symbol: normalize_symbol(&quote.symbol),
            price: quote.price,
            datetime: format_timestamp(&quote.timestamp),
        }
    }
}

impl TryFrom<QuoteDB> for Quote {
    type Error = StorageError;

    fn try_from(row: QuoteDB) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&row.datetime)?;
        Ok(Quote {
            price: row.price,
            symbol: row.symbol,
            timestamp,
        })
    }
}
