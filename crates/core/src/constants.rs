use std::time::Duration;

/// Symbols tracked when no explicit set is configured.
pub const DEFAULT_SYMBOLS: &[&str] = &["fb", "amzn", "aapl", "nflx", "goog"];

/// Interval between poll cycles when the configured one is not positive.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Poller-side deadline for a single price source fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Number of quotes returned by a read when the caller does not ask for more.
pub const DEFAULT_LAST: i64 = 1;

/// Returns the default symbol set as owned strings.
pub fn default_symbols() -> Vec<String> {
    DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect()
}
