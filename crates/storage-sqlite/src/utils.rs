//! Helpers shared by the SQLite repositories.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::StorageError;

/// Maximum number of bound parameters per statement.
///
/// Stays under the historical `SQLITE_MAX_VARIABLE_NUMBER` of 999 with room
/// for the other parameters of a query.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Splits `items` into slices small enough for one `IN (...)` clause.
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_MAX_PARAMS_CHUNK)
}

/// Splits rows for a multi-row `INSERT` binding `columns` parameters per row.
pub fn chunk_rows_for_sqlite<T>(rows: &[T], columns: usize) -> impl Iterator<Item = &[T]> {
    rows.chunks((SQLITE_MAX_PARAMS_CHUNK / columns.max(1)).max(1))
}

/// Encodes a timestamp as fixed-width RFC 3339 UTC with nanoseconds.
///
/// The fixed width keeps lexical and chronological order identical.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidValue(format!("datetime {:?}: {}", value, e)))
}
