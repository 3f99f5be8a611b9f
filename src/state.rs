use std::sync::Arc;

use crate::broadcast::Broadcaster;
use crate::cache::RefreshCache;
use crate::config::HubConfig;
use crate::error::ProviderError;
use crate::provider::MarketDataProvider;
use crate::providers::CoinGeckoProvider;
use crate::registry::SubscriberRegistry;
use crate::types::MarketQuery;

/// Shared application state, passed to all route handlers via `axum::extract::State`.
pub struct AppState {
    pub config: HubConfig,
    /// Uncached upstream access for one-off queries.
    pub provider: Arc<dyn MarketDataProvider>,
    /// Top-N snapshot cache shared with the broadcast loop.
    pub cache: RefreshCache,
    pub registry: Arc<SubscriberRegistry>,
}

impl AppState {
    /// Builds state against the configured CoinGecko endpoint
    pub fn new(config: HubConfig) -> Result<Arc<Self>, ProviderError> {
        let provider = CoinGeckoProvider::with_base_url(&config.api_url, config.request_timeout)?;
        Ok(Self::with_provider(config, Arc::new(provider)))
    }

    pub fn with_provider(config: HubConfig, provider: Arc<dyn MarketDataProvider>) -> Arc<Self> {
        let query = MarketQuery::top(config.coin_limit, &config.vs_currency);
        let cache = RefreshCache::new(Arc::clone(&provider), query, config.cache_ttl);

        Arc::new(Self {
            config,
            provider,
            cache,
            registry: Arc::new(SubscriberRegistry::new()),
        })
    }

    /// The broadcast loop feeding this state's subscribers
    pub fn broadcaster(&self) -> Broadcaster {
        Broadcaster::new(
            self.cache.clone(),
            Arc::clone(&self.registry),
            self.config.broadcast_interval,
            self.config.send_timeout,
        )
    }
}
