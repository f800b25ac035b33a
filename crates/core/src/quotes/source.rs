//! Price source trait.

use async_trait::async_trait;

use super::model::Quote;
use crate::errors::Result;

/// An external service that returns one current quote per requested symbol.
///
/// A fetch succeeds or fails as a unit: implementations never return a
/// partial set. Returned quotes carry no ordering or uniqueness guarantee.
/// Implementations bound each call with their own timeout.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Identifier used in logs, e.g. "IEX_CLOUD".
    fn id(&self) -> &'static str;

    async fn fetch(&self, symbols: &[String]) -> Result<Vec<Quote>>;
}
