use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text};
use diesel::sqlite::Sqlite;
use log::{debug, info};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use stonks_core::constants::default_symbols;
use stonks_core::errors::{Error, Result};
use stonks_core::quotes::{clamp_last, normalize_symbol, Quote, QuoteBatch, QuoteStore};
use stonks_core::QuoteMetrics;

use super::model::{NewQuoteDB, QuoteDB};
use crate::db::{
    create_pool, get_connection, init, spawn_writer, validate_pool_settings, DbPool,
    PoolSettings, WriteHandle,
};
use crate::errors::{IntoCore, StorageError};
use crate::schema::quotes;
use crate::utils::{chunk_for_sqlite, chunk_rows_for_sqlite};

pub const DEFAULT_DATABASE_FILE: &str = "stonks.sqlite";

/// What to do with an existing database file on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupMode {
    /// Delete any existing file and start with an empty history.
    #[default]
    Fresh,
    /// Keep the existing history.
    Reuse,
}

/// Configuration for [`SqliteQuoteStore`].
#[derive(Debug, Clone)]
pub struct SqliteStoreConfig {
    pub database_file: String,
    pub startup: StartupMode,
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub max_idle_connections: u32,
    /// `None` = connections are never recycled by age.
    pub conn_max_lifetime: Option<Duration>,
    /// Default symbol set for batch reads.
    pub symbols: Vec<String>,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            database_file: DEFAULT_DATABASE_FILE.to_string(),
            startup: StartupMode::Fresh,
            max_connections: 8,
            max_idle_connections: 2,
            conn_max_lifetime: None,
            symbols: default_symbols(),
        }
    }
}

struct Handles {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

/// Durable [`QuoteStore`] backed by a single SQLite file.
///
/// Writes go through the single writer connection, one transaction per
/// append. Reads use pooled connections and see the last committed state.
pub struct SqliteQuoteStore {
    // `None` once closed.
    handles: RwLock<Option<Handles>>,
    symbols: Vec<String>,
    metrics: Arc<QuoteMetrics>,
}

impl SqliteQuoteStore {
    /// Opens (or recreates) the database and starts the writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: SqliteStoreConfig, metrics: Arc<QuoteMetrics>) -> Result<Self> {
        let settings = PoolSettings {
            max_size: config.max_connections,
            min_idle: config.max_idle_connections,
            max_lifetime: config.conn_max_lifetime,
        };
        validate_pool_settings(&settings)?;

        let mut symbols: Vec<String> = Vec::with_capacity(config.symbols.len());
        for symbol in config.symbols.iter().map(|s| normalize_symbol(s)) {
            if !symbol.is_empty() && !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        init(&config.database_file, config.startup == StartupMode::Fresh)?;
        let pool = create_pool(&config.database_file, settings)?;
        let writer = spawn_writer(&pool)?;

        info!(
            "SQLite quote store opened at {} (pool size {})",
            config.database_file, config.max_connections
        );

        Ok(Self {
            handles: RwLock::new(Some(Handles { pool, writer })),
            symbols,
            metrics,
        })
    }

    fn pool(&self) -> Result<Arc<DbPool>> {
        let guard = self
            .handles
            .read()
            .map_err(|_| Error::Unexpected("quote store lock poisoned".to_string()))?;
        guard
            .as_ref()
            .map(|h| Arc::clone(&h.pool))
            .ok_or(Error::Closed)
    }

    fn writer(&self) -> Result<WriteHandle> {
        let guard = self
            .handles
            .read()
            .map_err(|_| Error::Unexpected("quote store lock poisoned".to_string()))?;
        guard.as_ref().map(|h| h.writer.clone()).ok_or(Error::Closed)
    }

    fn load_ranked(
        conn: &mut SqliteConnection,
        symbols: &[String],
        last: usize,
    ) -> Result<Vec<QuoteDB>> {
        let placeholders = symbols.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let sql = format!(
            "WITH RankedQuotes AS ( \
                SELECT \
                    q.id, q.symbol, q.price, q.datetime, \
                    ROW_NUMBER() OVER (PARTITION BY q.symbol ORDER BY q.id DESC) AS rn \
                FROM quotes q WHERE q.symbol IN ({}) \
            ) \
            SELECT id, symbol, price, datetime, rn \
            FROM RankedQuotes \
            WHERE rn <= ? \
            ORDER BY symbol, rn",
            placeholders
        );

        let mut query_builder = sql_query(sql).into_boxed::<Sqlite>();
        for symbol in symbols {
            query_builder = query_builder.bind::<Text, _>(symbol.as_str());
        }
        query_builder = query_builder.bind::<BigInt, _>(last as i64);

        query_builder.load::<QuoteDB>(conn).into_core()
    }
}

fn into_quotes(rows: Vec<QuoteDB>) -> Result<Vec<Quote>> {
    rows.into_iter()
        .map(|row| Quote::try_from(row).map_err(Error::from))
        .collect()
}

#[async_trait]
impl QuoteStore for SqliteQuoteStore {
    async fn append(&self, new_quotes: &[Quote]) -> Result<()> {
        if new_quotes.is_empty() {
            return Ok(());
        }
        let writer = self.writer()?;

        let rows: Vec<NewQuoteDB> = new_quotes.iter().map(NewQuoteDB::from).collect();
        let count = rows.len();

        writer
            .exec(move |conn| {
                for chunk in chunk_rows_for_sqlite(&rows, 3) {
                    diesel::insert_into(quotes::table)
                        .values(chunk)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }
                Ok(())
            })
            .await?;

        self.metrics.record_appended(count);
        debug!("Appended {} quotes to SQLite", count);
        Ok(())
    }

    fn query(&self, symbol: &str, last: i64) -> Result<Vec<Quote>> {
        self.metrics.record_read();
        let pool = self.pool()?;
        let mut conn = get_connection(&pool)?;

        let symbol = normalize_symbol(symbol);
        let rows = quotes::table
            .filter(quotes::symbol.eq(&symbol))
            .order(quotes::id.desc())
            .limit(clamp_last(last) as i64)
            .select(QuoteDB::as_select())
            .load::<QuoteDB>(&mut conn)
            .into_core()?;

        if rows.is_empty() {
            return Err(Error::NotFound(format!("no quotes for symbol '{}'", symbol)));
        }
        into_quotes(rows)
    }

    fn query_batch(&self, symbols: &[String], last: i64) -> Result<QuoteBatch> {
        self.metrics.record_read();
        let pool = self.pool()?;

        let mut requested: Vec<String> = Vec::new();
        for symbol in symbols.iter().map(|s| normalize_symbol(s)) {
            if !symbol.is_empty() && !requested.contains(&symbol) {
                requested.push(symbol);
            }
        }
        if requested.is_empty() {
            requested = self.symbols.clone();
        }
        if requested.is_empty() {
            return Err(Error::NotFound("no symbols requested".to_string()));
        }

        let last = clamp_last(last);
        let mut conn = get_connection(&pool)?;
        let mut batch = QuoteBatch::new();

        for chunk in chunk_for_sqlite(&requested) {
            // Rows arrive grouped by symbol, newest first within a group.
            for row in Self::load_ranked(&mut conn, chunk, last)? {
                let quote = Quote::try_from(row)?;
                batch.entry(quote.symbol.clone()).or_default().push(quote);
            }
        }

        if batch.is_empty() {
            return Err(Error::NotFound(format!(
                "no quotes for symbols {}",
                requested.join(", ")
            )));
        }
        Ok(batch)
    }

    fn symbols(&self) -> Vec<String> {
        self.symbols.clone()
    }

    fn close(&self) -> Result<()> {
        let mut guard = self
            .handles
            .write()
            .map_err(|_| Error::Unexpected("quote store lock poisoned".to_string()))?;
        if guard.take().is_some() {
            info!("SQLite quote store closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stonks_core::errors::DatabaseError;
    use tempfile::tempdir;

    /// Creates a store on a fresh temp database.
    /// Returns the temp dir too, to keep it alive.
    fn create_test_store(symbols: &[&str]) -> (SqliteQuoteStore, tempfile::TempDir) {
        let temp_dir = tempdir().expect("Failed to create temp directory");
        let config = test_config(&temp_dir, symbols, StartupMode::Fresh);
        let store = SqliteQuoteStore::new(config, Arc::new(QuoteMetrics::new()))
            .expect("Failed to open store");
        (store, temp_dir)
    }

    fn test_config(
        temp_dir: &tempfile::TempDir,
        symbols: &[&str],
        startup: StartupMode,
    ) -> SqliteStoreConfig {
        SqliteStoreConfig {
            database_file: temp_dir
                .path()
                .join("stonks.sqlite")
                .to_string_lossy()
                .to_string(),
            startup,
            max_connections: 4,
            max_idle_connections: 1,
            conn_max_lifetime: None,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn quote(symbol: &str, price: f64) -> Quote {
        Quote::new(symbol, price, Utc::now())
    }

    fn prices(quotes: &[Quote]) -> Vec<f64> {
        quotes.iter().map(|q| q.price).collect()
    }

    #[tokio::test]
    async fn test_query_returns_newest_first() {
        let (store, _dir) = create_test_store(&["fb"]);

        store.append(&[quote("fb", 1.0)]).await.unwrap();
        store.append(&[quote("fb", 2.0)]).await.unwrap();
        store.append(&[quote("fb", 3.0)]).await.unwrap();

        assert_eq!(prices(&store.query("fb", 2).unwrap()), vec![3.0, 2.0]);
        assert_eq!(prices(&store.query("fb", 10).unwrap()), vec![3.0, 2.0, 1.0]);
    }

    #[tokio::test]
    async fn test_query_clamps_last_to_one() {
        let (store, _dir) = create_test_store(&["fb"]);
        store
            .append(&[quote("fb", 1.0), quote("fb", 2.0)])
            .await
            .unwrap();

        assert_eq!(prices(&store.query("fb", 0).unwrap()), vec![2.0]);
        assert_eq!(prices(&store.query("fb", -5).unwrap()), vec![2.0]);
    }

    #[tokio::test]
    async fn test_recency_is_insertion_order() {
        let (store, _dir) = create_test_store(&["fb"]);
        let later = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let earlier = Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap();

        store
            .append(&[Quote::new("fb", 1.0, later)])
            .await
            .unwrap();
        store
            .append(&[Quote::new("fb", 2.0, earlier)])
            .await
            .unwrap();

        let latest = store.query("fb", 1).unwrap();
        assert_eq!(latest[0].price, 2.0);
        assert_eq!(latest[0].timestamp, earlier);
    }

    #[tokio::test]
    async fn test_query_unknown_symbol_is_not_found() {
        let (store, _dir) = create_test_store(&["fb"]);
        store.append(&[quote("fb", 1.0)]).await.unwrap();

        let err = store.query("goog", 1).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_query_normalizes_symbol_case() {
        let (store, _dir) = create_test_store(&["fb"]);
        store.append(&[quote("FB", 1.0)]).await.unwrap();

        let result = store.query("Fb", 1).unwrap();
        assert_eq!(result[0].symbol, "fb");
    }

    #[tokio::test]
    async fn test_append_lowercases_uppercase_symbols() {
        let (store, _dir) = create_test_store(&["fb"]);
        let literal = Quote {
            price: 9.5,
            symbol: "FB".to_string(),
            timestamp: Utc::now(),
        };
        store.append(&[literal]).await.unwrap();

        let latest = store.query("fb", 1).unwrap();
        assert_eq!(latest[0].symbol, "fb");
        assert_eq!(prices(&latest), vec![9.5]);
        let batch = store.query_batch(&["FB".to_string()], 1).unwrap();
        assert_eq!(prices(&batch["fb"]), vec![9.5]);
    }

    #[tokio::test]
    async fn test_timestamps_round_trip_as_utc() {
        let (store, _dir) = create_test_store(&["fb"]);
        let ts = Utc.timestamp_nanos(1_609_459_200_123_456_789);

        store.append(&[Quote::new("fb", 123.4, ts)]).await.unwrap();

        let stored = store.query("fb", 1).unwrap();
        assert_eq!(stored[0].timestamp, ts);
        assert_eq!(stored[0].price, 123.4);
    }

    #[tokio::test]
    async fn test_query_batch_scenario() {
        let (store, _dir) = create_test_store(&["fb", "goog", "nflx"]);

        store
            .append(&[quote("fb", 123.40), quote("goog", 234.51)])
            .await
            .unwrap();
        store
            .append(&[quote("fb", 123.42), quote("goog", 234.56)])
            .await
            .unwrap();

        let batch = store
            .query_batch(&["fb".to_string(), "goog".to_string()], 2)
            .unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(prices(&batch["fb"]), vec![123.42, 123.40]);
        assert_eq!(prices(&batch["goog"]), vec![234.56, 234.51]);
    }

    #[tokio::test]
    async fn test_query_batch_limits_each_symbol() {
        let (store, _dir) = create_test_store(&["fb", "goog"]);
        for i in 0..5 {
            store
                .append(&[quote("fb", i as f64), quote("goog", 100.0 + i as f64)])
                .await
                .unwrap();
        }

        let batch = store
            .query_batch(&["fb".to_string(), "goog".to_string()], 3)
            .unwrap();

        assert_eq!(prices(&batch["fb"]), vec![4.0, 3.0, 2.0]);
        assert_eq!(prices(&batch["goog"]), vec![104.0, 103.0, 102.0]);
    }

    #[tokio::test]
    async fn test_query_batch_omits_symbols_without_history() {
        let (store, _dir) = create_test_store(&["fb", "goog"]);
        store.append(&[quote("fb", 1.0)]).await.unwrap();

        let batch = store
            .query_batch(&["fb".to_string(), "goog".to_string()], 1)
            .unwrap();

        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key("fb"));
        assert!(!batch.contains_key("goog"));
    }

    #[tokio::test]
    async fn test_query_batch_empty_result_is_not_found() {
        let (store, _dir) = create_test_store(&["fb"]);

        let err = store.query_batch(&["fb".to_string()], 1).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_query_batch_defaults_to_configured_symbols() {
        let (store, _dir) = create_test_store(&["fb", "aapl"]);
        store
            .append(&[quote("fb", 1.0), quote("aapl", 2.0), quote("nflx", 3.0)])
            .await
            .unwrap();

        let batch = store.query_batch(&[], 1).unwrap();

        let mut keys: Vec<&String> = batch.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["aapl", "fb"]);
    }

    #[tokio::test]
    async fn test_query_batch_handles_more_symbols_than_one_chunk() {
        let (store, _dir) = create_test_store(&["fb"]);
        let symbols: Vec<String> = (0..1200).map(|i| format!("s{}", i)).collect();
        let new_quotes: Vec<Quote> = symbols.iter().map(|s| quote(s, 1.0)).collect();
        store.append(&new_quotes).await.unwrap();

        let batch = store.query_batch(&symbols, 1).unwrap();
        assert_eq!(batch.len(), 1200);
    }

    #[tokio::test]
    async fn test_append_is_all_or_nothing() {
        let (store, _dir) = create_test_store(&["fb"]);
        let mut new_quotes: Vec<Quote> = (0..400).map(|i| quote("fb", i as f64)).collect();
        // NaN binds as NULL and violates the NOT NULL constraint.
        new_quotes.push(quote("aapl", f64::NAN));

        let err = store.append(&new_quotes).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Database(DatabaseError::TransactionFailed(_))
        ));
        assert!(store.query("fb", 1).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_append_empty_is_noop() {
        let (store, _dir) = create_test_store(&["fb"]);
        store.append(&[]).await.unwrap();
        assert!(store.query("fb", 1).is_err());
    }

    #[tokio::test]
    async fn test_append_accepts_untracked_symbols() {
        let (store, _dir) = create_test_store(&["fb"]);
        store.append(&[quote("tsla", 1.0)]).await.unwrap();

        assert_eq!(store.query("tsla", 1).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reuse_keeps_history_and_fresh_discards_it() {
        let temp_dir = tempdir().unwrap();
        let metrics = Arc::new(QuoteMetrics::new());

        let store = SqliteQuoteStore::new(
            test_config(&temp_dir, &["fb"], StartupMode::Fresh),
            metrics.clone(),
        )
        .unwrap();
        store.append(&[quote("fb", 1.0)]).await.unwrap();
        store.close().unwrap();

        let reused = SqliteQuoteStore::new(
            test_config(&temp_dir, &["fb"], StartupMode::Reuse),
            metrics.clone(),
        )
        .unwrap();
        assert_eq!(prices(&reused.query("fb", 1).unwrap()), vec![1.0]);
        reused.close().unwrap();

        let fresh = SqliteQuoteStore::new(
            test_config(&temp_dir, &["fb"], StartupMode::Fresh),
            metrics,
        )
        .unwrap();
        assert!(fresh.query("fb", 1).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_operations() {
        let (store, _dir) = create_test_store(&["fb"]);
        store.append(&[quote("fb", 1.0)]).await.unwrap();

        store.close().unwrap();
        store.close().unwrap();

        assert!(matches!(store.query("fb", 1), Err(Error::Closed)));
        assert!(matches!(store.query_batch(&[], 1), Err(Error::Closed)));
        assert!(matches!(
            store.append(&[quote("fb", 2.0)]).await,
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn test_rejects_pool_without_reader_capacity() {
        let temp_dir = tempdir().unwrap();
        let mut config = test_config(&temp_dir, &["fb"], StartupMode::Fresh);
        config.max_connections = 1;

        let result = SqliteQuoteStore::new(config, Arc::new(QuoteMetrics::new()));
        assert!(matches!(result, Err(Error::InvalidConfigValue(_))));
    }

    #[tokio::test]
    async fn test_metrics_track_appends_and_reads() {
        let temp_dir = tempdir().unwrap();
        let metrics = Arc::new(QuoteMetrics::new());
        let store = SqliteQuoteStore::new(
            test_config(&temp_dir, &["fb"], StartupMode::Fresh),
            metrics.clone(),
        )
        .unwrap();

        store.append(&[quote("fb", 1.0), quote("fb", 2.0)]).await.unwrap();
        store.query("fb", 1).unwrap();
        store.query_batch(&[], 1).unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.quotes_appended, 2);
        assert_eq!(snapshot.reads, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reads_run_while_writes_continue() {
        let (store, _dir) = create_test_store(&["fb"]);
        let store = Arc::new(store);
        store.append(&[quote("fb", 0.0)]).await.unwrap();

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for i in 1..=20 {
                    store.append(&[quote("fb", i as f64)]).await.unwrap();
                }
            })
        };

        for _ in 0..20 {
            let latest = store.query("fb", 1).unwrap();
            assert_eq!(latest.len(), 1);
        }
        writer.await.unwrap();

        assert_eq!(store.query("fb", 1).unwrap()[0].price, 20.0);
    }
}
