//! Database file preparation and connection pooling.

use log::{debug, info};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use diesel::connection::{Connection, SimpleConnection};
use diesel::r2d2::{self, ConnectionManager, PooledConnection};
use diesel::sqlite::SqliteConnection;

use crate::errors::{IntoCore, StorageError};
use stonks_core::errors::{Error, Result};

pub mod write_actor;
pub use write_actor::{spawn_writer, WriteHandle};

pub type DbPool = r2d2::Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

const BUSY_TIMEOUT_MS: u32 = 30_000;
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

const CREATE_QUOTES_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS quotes (
        id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
        symbol TEXT NOT NULL,
        price REAL NOT NULL,
        datetime TIMESTAMP NOT NULL
    );
    CREATE INDEX IF NOT EXISTS quotes_symbol_id ON quotes (symbol, id DESC);
";

/// Pool sizing for [`create_pool`].
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_size: u32,
    pub min_idle: u32,
    /// `None` keeps connections open indefinitely.
    pub max_lifetime: Option<Duration>,
}

/// Prepares the database file and the `quotes` table.
///
/// With `fresh` set, any existing database file and its WAL/SHM companions
/// are removed first, discarding all history.
pub fn init(db_path: &str, fresh: bool) -> Result<()> {
    let path = Path::new(db_path);

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(StorageError::from)?;
        }
    }

    if fresh {
        for file in [
            db_path.to_string(),
            format!("{}-wal", db_path),
            format!("{}-shm", db_path),
        ] {
            if Path::new(&file).exists() {
                debug!("Removing {}", file);
                fs::remove_file(&file).map_err(StorageError::from)?;
            }
        }
    }

    let mut conn = SqliteConnection::establish(db_path).map_err(StorageError::from)?;
    conn.batch_execute(&format!(
        "PRAGMA journal_mode = WAL; PRAGMA busy_timeout = {};",
        BUSY_TIMEOUT_MS
    ))
    .into_core()?;
    conn.batch_execute(CREATE_QUOTES_TABLE).into_core()?;

    info!(
        "Quote database ready at {} ({})",
        db_path,
        if fresh { "fresh" } else { "reused" }
    );
    Ok(())
}

pub fn create_pool(db_path: &str, settings: PoolSettings) -> Result<Arc<DbPool>> {
    let manager = ConnectionManager::<SqliteConnection>::new(db_path);
    let pool = r2d2::Pool::builder()
        .max_size(settings.max_size)
        .min_idle(Some(settings.min_idle.min(settings.max_size)))
        .max_lifetime(settings.max_lifetime)
        .connection_timeout(CONNECTION_TIMEOUT)
        .connection_customizer(Box::new(ConnectionCustomizer))
        .build(manager)
        .map_err(StorageError::from)?;
    Ok(Arc::new(pool))
}

pub fn get_connection(pool: &DbPool) -> Result<DbConnection> {
    pool.get().into_core()
}

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {}; PRAGMA synchronous = NORMAL;",
            BUSY_TIMEOUT_MS
        ))
        .map_err(r2d2::Error::QueryError)
    }
}

/// Rejects pool settings that would starve readers of connections.
pub(crate) fn validate_pool_settings(settings: &PoolSettings) -> Result<()> {
    // The writer holds one connection for its whole lifetime.
    if settings.max_size < 2 {
        return Err(Error::InvalidConfigValue(format!(
            "max_connections must be at least 2, got {}",
            settings.max_size
        )));
    }
    Ok(())
}
