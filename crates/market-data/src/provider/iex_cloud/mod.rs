//! IEX Cloud provider implementation.
//!
//! Fetches current quotes for a set of symbols with a single call to the
//! batch endpoint.
//!
//! # API Endpoint
//!
//! - Batch quotes: `{batch_endpoint}?types=quote&token={token}&symbols={a,b,c}`
//!
//! # Response Format
//!
//! ```json
//! { "FB": { "quote": { "symbol": "FB", "latestPrice": 123.4, "latestUpdate": 1609459200123 } } }
//! ```

mod models;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode, Url};
use std::sync::Arc;
use std::time::Duration;
use stonks_core::quotes::{PriceSource, Quote};
use stonks_core::QuoteMetrics;

use crate::errors::MarketDataError;
use models::{ensure_complete, into_quotes, BatchResponse};

pub const DEFAULT_BATCH_ENDPOINT: &str = "https://sandbox.iexapis.com/stable/stock/market/batch";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

const PROVIDER_ID: &str = "IEX_CLOUD";

/// Settings for [`IexCloudProvider`].
#[derive(Debug, Clone)]
pub struct IexCloudConfig {
    pub token: String,
    pub batch_endpoint: String,
    /// Upper bound on a single HTTP call.
    pub call_timeout: Duration,
}

impl IexCloudConfig {
    /// Config with the given token and default endpoint and timeout.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            batch_endpoint: DEFAULT_BATCH_ENDPOINT.to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// IEX Cloud price source.
///
/// # Example
///
/// ```ignore
/// let metrics = Arc::new(QuoteMetrics::new());
/// let provider = IexCloudProvider::new(IexCloudConfig::new("pk_..."), metrics)?;
/// let quotes = provider.get_quotes(&["fb".to_string()]).await?;
/// ```
pub struct IexCloudProvider {
    client: Client,
    endpoint: Url,
    token: String,
    metrics: Arc<QuoteMetrics>,
}

impl IexCloudProvider {
    /// Validates the config and builds the HTTP client.
    pub fn new(
        config: IexCloudConfig,
        metrics: Arc<QuoteMetrics>,
    ) -> Result<Self, MarketDataError> {
        if config.token.trim().is_empty() {
            return Err(MarketDataError::InvalidToken);
        }

        let endpoint = Url::parse(&config.batch_endpoint).map_err(|e| {
            MarketDataError::InvalidEndpoint {
                endpoint: config.batch_endpoint.clone(),
                message: e.to_string(),
            }
        })?;

        let client = Client::builder().timeout(config.call_timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            token: config.token,
            metrics,
        })
    }

    /// Fetches the current quote for every symbol in one request.
    ///
    /// Fails unless the response carries a quote for every requested symbol.
    pub async fn get_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, MarketDataError> {
        if symbols.is_empty() {
            return Err(MarketDataError::EmptySymbols);
        }

        let joined = symbols.join(",").to_lowercase();
        debug!("Requesting {} quotes from {}", symbols.len(), PROVIDER_ID);
        let _request = self.metrics.track_client_request();

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("types", "quote"),
                ("token", self.token.as_str()),
                ("symbols", joined.as_str()),
            ])
            .send()
            .await
            .map_err(Self::map_request_error)?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}: {}", status, body.trim()),
            });
        }

        let text = response.text().await.map_err(Self::map_request_error)?;
        let batch: BatchResponse =
            serde_json::from_str(&text).map_err(|e| MarketDataError::Decode(e.to_string()))?;

        let quotes = into_quotes(batch)?;
        ensure_complete(symbols, &quotes)?;
        Ok(quotes)
    }

    fn map_request_error(err: reqwest::Error) -> MarketDataError {
        if err.is_timeout() {
            MarketDataError::Timeout {
                provider: PROVIDER_ID.to_string(),
            }
        } else {
            MarketDataError::Network(err)
        }
    }
}

#[async_trait]
impl PriceSource for IexCloudProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn fetch(&self, symbols: &[String]) -> stonks_core::Result<Vec<Quote>> {
        Ok(self.get_quotes(symbols).await?)
    }
}
