use std::{net::SocketAddr, time::Duration};

use anyhow::{anyhow, Context};
use stonks_core::constants::{default_symbols, DEFAULT_FETCH_TIMEOUT, DEFAULT_POLL_INTERVAL};
use stonks_core::poll::PollerConfig;
use stonks_market_data::provider::iex_cloud::{DEFAULT_BATCH_ENDPOINT, DEFAULT_CALL_TIMEOUT};
use stonks_market_data::IexCloudConfig;
use stonks_storage_sqlite::quotes::DEFAULT_DATABASE_FILE;

/// Deadline applied to each read API request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub request_timeout: Duration,
    pub symbols: Vec<String>,
    /// Zero means "use the poller default".
    pub poll_interval: Duration,
    pub storage: StorageKind,
    pub db_path: String,
    pub db_reuse: bool,
    pub sqlite_max_idle_conns: u32,
    pub sqlite_conn_max_lifetime: Option<Duration>,
    pub iex_token: String,
    pub iex_batch_endpoint: String,
    pub iex_call_timeout: Duration,
}

impl Config {
    /// Reads the configuration from the process environment, loading `.env`
    /// first when present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let listen_addr: SocketAddr = var("STONKS_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:18081".to_string())
            .parse()
            .context("Invalid STONKS_LISTEN_ADDR")?;

        let request_timeout = match var("STONKS_REQUEST_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(
                v.trim()
                    .parse()
                    .context("Invalid STONKS_REQUEST_TIMEOUT_MS")?,
            ),
            None => DEFAULT_REQUEST_TIMEOUT,
        };
        if request_timeout.is_zero() {
            return Err(anyhow!("STONKS_REQUEST_TIMEOUT_MS must be positive"));
        }

        let symbols = match var("STONKS_SYMBOLS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => default_symbols(),
        };

        let poll_secs: i64 = match var("STONKS_POLL_INTERVAL_SECS") {
            Some(v) => v
                .trim()
                .parse()
                .context("Invalid STONKS_POLL_INTERVAL_SECS")?,
            None => DEFAULT_POLL_INTERVAL.as_secs() as i64,
        };
        let poll_interval = if poll_secs > 0 {
            Duration::from_secs(poll_secs as u64)
        } else {
            Duration::ZERO
        };

        let storage = match var("STONKS_STORAGE").as_deref().map(str::trim) {
            None | Some("sqlite") => StorageKind::Sqlite,
            Some("memory") => StorageKind::Memory,
            Some(other) => return Err(anyhow!("Invalid STONKS_STORAGE: {}", other)),
        };

        let db_path = var("STONKS_DB_PATH").unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string());

        let db_reuse = match var("STONKS_DB_REUSE") {
            Some(v) => v.trim().parse().context("Invalid STONKS_DB_REUSE")?,
            None => false,
        };

        let sqlite_max_idle_conns = match var("STONKS_SQLITE_MAX_IDLE_CONNS") {
            Some(v) => v
                .trim()
                .parse()
                .context("Invalid STONKS_SQLITE_MAX_IDLE_CONNS")?,
            None => 2,
        };

        let sqlite_conn_max_lifetime = match var("STONKS_SQLITE_CONN_MAX_LIFETIME_SECS") {
            Some(v) => {
                let secs: u64 = v
                    .trim()
                    .parse()
                    .context("Invalid STONKS_SQLITE_CONN_MAX_LIFETIME_SECS")?;
                Some(Duration::from_secs(secs))
            }
            None => None,
        };

        let iex_token =
            var("STONKS_IEX_TOKEN").ok_or_else(|| anyhow!("STONKS_IEX_TOKEN is required"))?;

        let iex_batch_endpoint =
            var("STONKS_IEX_BATCH_ENDPOINT").unwrap_or_else(|| DEFAULT_BATCH_ENDPOINT.to_string());

        let iex_call_timeout = match var("STONKS_IEX_CALL_TIMEOUT_MS") {
            Some(v) => Duration::from_millis(
                v.trim()
                    .parse()
                    .context("Invalid STONKS_IEX_CALL_TIMEOUT_MS")?,
            ),
            None => DEFAULT_CALL_TIMEOUT,
        };

        Ok(Self {
            listen_addr,
            request_timeout,
            symbols,
            poll_interval,
            storage,
            db_path,
            db_reuse,
            sqlite_max_idle_conns,
            sqlite_conn_max_lifetime,
            iex_token,
            iex_batch_endpoint,
            iex_call_timeout,
        })
    }

    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            interval: self.poll_interval,
            symbols: self.symbols.clone(),
            fetch_timeout: self.iex_call_timeout.max(DEFAULT_FETCH_TIMEOUT),
        }
    }

    pub fn iex_config(&self) -> IexCloudConfig {
        IexCloudConfig {
            token: self.iex_token.clone(),
            batch_endpoint: self.iex_batch_endpoint.clone(),
            call_timeout: self.iex_call_timeout,
        }
    }
}
