use std::sync::Arc;

use crate::config::{Config, StorageKind};
use stonks_core::quotes::{MemoryQuoteStore, MemoryStoreConfig, PriceSource, QuoteStore};
use stonks_core::QuoteMetrics;
use stonks_market_data::IexCloudProvider;
use stonks_storage_sqlite::{SqliteQuoteStore, SqliteStoreConfig, StartupMode};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

pub struct AppState {
    pub store: Arc<dyn QuoteStore>,
    pub metrics: Arc<QuoteMetrics>,
}

/// Installs the global subscriber. Library crates log through `log`; their
/// records are forwarded into the same subscriber.
pub fn init_tracing() {
    let log_format = std::env::var("STONKS_LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// Opens the storage engine selected by the configuration.
///
/// The SQLite engine starts its writer task, so this must run inside the
/// Tokio runtime.
pub fn build_store(
    config: &Config,
    metrics: Arc<QuoteMetrics>,
) -> anyhow::Result<Arc<dyn QuoteStore>> {
    let store: Arc<dyn QuoteStore> = match config.storage {
        StorageKind::Memory => {
            tracing::info!("Using in-memory quote store");
            Arc::new(MemoryQuoteStore::new(
                MemoryStoreConfig {
                    symbols: config.symbols.clone(),
                },
                metrics,
            )?)
        }
        StorageKind::Sqlite => {
            let store_config = SqliteStoreConfig {
                database_file: config.db_path.clone(),
                startup: if config.db_reuse {
                    StartupMode::Reuse
                } else {
                    StartupMode::Fresh
                },
                max_idle_connections: config.sqlite_max_idle_conns,
                conn_max_lifetime: config.sqlite_conn_max_lifetime,
                symbols: config.symbols.clone(),
                ..SqliteStoreConfig::default()
            };
            Arc::new(SqliteQuoteStore::new(store_config, metrics)?)
        }
    };
    Ok(store)
}

pub fn build_source(
    config: &Config,
    metrics: Arc<QuoteMetrics>,
) -> anyhow::Result<Arc<dyn PriceSource>> {
    let provider = IexCloudProvider::new(config.iex_config(), metrics)?;
    Ok(Arc::new(provider))
}

pub fn build_state(store: Arc<dyn QuoteStore>, metrics: Arc<QuoteMetrics>) -> Arc<AppState> {
    Arc::new(AppState { store, metrics })
}
