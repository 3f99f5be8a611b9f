//! CoinGecko market data provider implementation

use crate::{
    constants::{
        COINGECKO_API_URL, COINGECKO_MARKETS_ENDPOINT, COINGECKO_SIMPLE_PRICE_ENDPOINT,
        REQUEST_TIMEOUT_SECS, USER_AGENT,
    },
    error::ProviderError,
    provider::MarketDataProvider,
    types::{CoinRecord, MarketChart, MarketQuery, SimplePrice},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Upstream bodies quoted in errors are cut to this many chars
const MAX_ERROR_BODY_CHARS: usize = 256;

/// CoinGecko market data provider
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl CoinGeckoProvider {
    /// Creates a provider against the public CoinGecko API
    pub fn new() -> Result<Self, ProviderError> {
        Self::with_base_url(COINGECKO_API_URL, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Creates a provider against `base_url` (e.g. the pro API or a proxy)
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ProviderError::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Sends the request and decodes a JSON body of type `T`
    ///
    /// Transport failures, non-2xx statuses and undecodable bodies come back
    /// as distinct `ProviderError` variants.
    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_request(e, self.timeout))?;

        let status = response.status();

        // Check for rate limiting
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimitExceeded);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS).to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_request(e, self.timeout))?;

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::malformed(format!(
                "Failed to parse CoinGecko response: {}. Response: {}",
                e,
                truncate(&body, MAX_ERROR_BODY_CHARS)
            ))
        })
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn market_params(query: &MarketQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("vs_currency", query.vs_currency.clone()),
        ("order", "market_cap_desc".to_string()),
        ("per_page", query.per_page.to_string()),
        ("page", query.page.to_string()),
    ];
    if query.include_24h_change {
        params.push(("price_change_percentage", "24h".to_string()));
    }
    params
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    async fn fetch_markets(&self, query: &MarketQuery) -> Result<Vec<CoinRecord>, ProviderError> {
        let url = self.url(COINGECKO_MARKETS_ENDPOINT);
        tracing::debug!(url = %url, per_page = query.per_page, "Fetching markets from CoinGecko");

        let coins: Vec<CoinRecord> = self
            .get_json(self.client.get(&url).query(&market_params(query)))
            .await?;

        tracing::debug!(count = coins.len(), "Fetched markets from CoinGecko");
        Ok(coins)
    }

    async fn fetch_simple_price(
        &self,
        coin_id: &str,
        vs_currency: &str,
    ) -> Result<SimplePrice, ProviderError> {
        let url = self.url(COINGECKO_SIMPLE_PRICE_ENDPOINT);
        tracing::debug!(url = %url, coin_id, "Fetching simple price from CoinGecko");

        let request = self.client.get(&url).query(&[
            ("ids", coin_id),
            ("vs_currencies", vs_currency),
            ("include_market_cap", "true"),
            ("include_24hr_change", "true"),
        ]);
        self.get_json(request).await
    }

    async fn fetch_market_chart(
        &self,
        coin_id: &str,
        vs_currency: &str,
        days: u32,
    ) -> Result<MarketChart, ProviderError> {
        let url = self.url(&format!("/coins/{coin_id}/market_chart"));
        tracing::debug!(url = %url, days, "Fetching market chart from CoinGecko");

        let request = self
            .client
            .get(&url)
            .query(&[("vs_currency", vs_currency.to_string()), ("days", days.to_string())]);
        self.get_json(request).await
    }

    fn provider_name(&self) -> &'static str {
        "coingecko"
    }
}
