//! Types for the price hub

use crate::constants::MAX_COIN_LIMIT;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// One coin in a market snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,

    /// Price in the snapshot's quote currency
    #[serde(default, deserialize_with = "null_as_zero")]
    pub current_price: f64,

    #[serde(default, deserialize_with = "null_as_zero")]
    pub market_cap: f64,

    /// 24h price change percentage, absent for freshly listed coins
    #[serde(rename = "price_change_percentage_24h", default)]
    pub change_24h_pct: Option<f64>,
}

/// CoinGecko reports `null` prices for coins with no recent trades.
fn null_as_zero<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or_default())
}

/// Immutable batch of coin records as of one refresh
///
/// Shared behind `Arc` and replaced wholesale; never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub coins: Vec<CoinRecord>,
    /// `None` for the empty snapshot served before any successful fetch
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn new(coins: Vec<CoinRecord>) -> Self {
        Self {
            coins,
            fetched_at: Some(Utc::now()),
        }
    }

    /// Snapshot served when nothing has ever been fetched
    pub fn empty() -> Self {
        Self {
            coins: Vec::new(),
            fetched_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    /// Streaming wire form: the bare JSON array of coins
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.coins)
    }
}

/// Parameters of a `coins/markets` request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MarketQuery {
    pub vs_currency: String,
    pub per_page: u32,
    pub page: u32,
    /// Ask upstream for `price_change_percentage_24h`
    pub include_24h_change: bool,
}

impl MarketQuery {
    /// Top coins by market cap with 24h change, as cached and broadcast
    pub fn top(limit: u32, vs_currency: &str) -> Self {
        Self {
            vs_currency: vs_currency.to_lowercase(),
            per_page: limit.clamp(1, MAX_COIN_LIMIT),
            page: 1,
            include_24h_change: true,
        }
    }

    /// Plain listing by market cap, used for coin pickers
    pub fn listing(limit: u32, vs_currency: &str) -> Self {
        Self {
            vs_currency: vs_currency.to_lowercase(),
            per_page: limit.clamp(1, MAX_COIN_LIMIT),
            page: 1,
            include_24h_change: false,
        }
    }
}

/// Entry of the `top_coins` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinListing {
    pub id: String,
    pub name: String,
}

impl From<&CoinRecord> for CoinListing {
    fn from(coin: &CoinRecord) -> Self {
        Self {
            id: coin.id.clone(),
            name: coin.name.clone(),
        }
    }
}

/// CoinGecko `simple/price` response
///
/// Keyed by coin id, then by field (`usd`, `usd_market_cap`,
/// `usd_24h_change`). Passed through to callers unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimplePrice {
    #[serde(flatten)]
    pub quotes: HashMap<String, HashMap<String, Option<f64>>>,
}

impl SimplePrice {
    /// Spot price of `coin_id` in `vs_currency`, if reported
    pub fn price(&self, coin_id: &str, vs_currency: &str) -> Option<f64> {
        self.quotes.get(coin_id)?.get(vs_currency).copied().flatten()
    }
}

/// `[timestamp_ms, value]` pair from a market chart series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint(pub i64, pub f64);

/// CoinGecko `coins/{id}/market_chart` response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketChart {
    pub prices: Vec<ChartPoint>,
    #[serde(default)]
    pub market_caps: Vec<ChartPoint>,
    #[serde(default)]
    pub total_volumes: Vec<ChartPoint>,
}

/// Overall system health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fresh data is being served
    Healthy,
    /// Serving stale data after failed refreshes
    Degraded,
    /// Nothing to serve yet
    Unhealthy,
}

/// Component health information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional status message
    pub message: Option<String>,
    /// Component-specific details
    pub details: HashMap<String, serde_json::Value>,
    /// Last checked timestamp
    pub last_checked: DateTime<Utc>,
}
