//! Provider abstraction for fetching market data from external APIs

use crate::{
    error::ProviderError,
    types::{CoinRecord, MarketChart, MarketQuery, SimplePrice},
};
use async_trait::async_trait;

/// Trait for upstream market data providers
///
/// Each call is one network round trip with a bounded timeout. Callers decide
/// whether a failure is surfaced or absorbed.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Fetches one page of coins ordered by market cap
    ///
    /// # Arguments
    /// * `query` - Currency, page size and whether to include 24h change
    ///
    /// # Returns
    /// Coin records in upstream order, or an error if the fetch fails
    async fn fetch_markets(&self, query: &MarketQuery) -> Result<Vec<CoinRecord>, ProviderError>;

    /// Fetches spot price, market cap and 24h change for one coin
    async fn fetch_simple_price(
        &self,
        coin_id: &str,
        vs_currency: &str,
    ) -> Result<SimplePrice, ProviderError>;

    /// Fetches the price/market cap/volume series for the last `days` days
    async fn fetch_market_chart(
        &self,
        coin_id: &str,
        vs_currency: &str,
        days: u32,
    ) -> Result<MarketChart, ProviderError>;

    /// Returns the name of this provider
    fn provider_name(&self) -> &'static str;
}
