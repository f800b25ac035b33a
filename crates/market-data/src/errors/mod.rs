//! Error types for the market data crate.

use thiserror::Error;

/// Errors that can occur while fetching quotes from a provider.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The provider was configured without an API token.
    #[error("Invalid token")]
    InvalidToken,

    /// The configured endpoint is not a valid URL.
    #[error("Invalid endpoint {endpoint:?}: {message}")]
    InvalidEndpoint { endpoint: String, message: String },

    /// A fetch was requested for no symbols.
    #[error("Empty symbols")]
    EmptySymbols,

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited { provider: String },

    /// The request did not complete within the call timeout.
    #[error("Timeout: {provider}")]
    Timeout { provider: String },

    /// The provider answered with a non-success status.
    #[error("Provider error: {provider} - {message}")]
    ProviderError { provider: String, message: String },

    /// A symbol in the response carried no `quote` entry.
    #[error("'quote' key for symbol '{0}' not found")]
    MissingQuote(String),

    /// The response body could not be decoded into quotes.
    #[error("Decoding response: {0}")]
    Decode(String),

    /// A network error occurred while communicating with a provider.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<MarketDataError> for stonks_core::Error {
    fn from(err: MarketDataError) -> Self {
        stonks_core::Error::Source(err.to_string())
    }
}
