//! # Coin Price Hub
//!
//! Shared market-data cache and broadcaster sitting between the CoinGecko API
//! and many concurrent dashboard clients.
//!
//! ## Architecture
//!
//! ```text
//! Request handlers ──┐
//!                    ├──> RefreshCache ──(single flight)──> MarketDataProvider (CoinGecko)
//! Broadcaster (5s) ──┘         │
//!        │                     └── last good Snapshot
//!        └──> SubscriberRegistry ──> one queue per WebSocket connection
//! ```
//!
//! The cache keeps one top-N snapshot. Reads within the TTL are served from
//! memory; the first stale read starts a refresh and every concurrent read
//! joins it. A failed refresh leaves the previous snapshot in place.
//!
//! ## Usage
//!
//! ```no_run
//! use coin_price_hub::{AppState, HubConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let state = AppState::new(HubConfig::from_env())?;
//! state.broadcaster().spawn();
//!
//! let snapshot = state.cache.snapshot().await;
//! for coin in &snapshot.coins {
//!     println!("{}: {:.2}", coin.symbol, coin.current_price);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! Defaults live in [`constants`] and can be overridden through environment
//! variables read by [`HubConfig::from_env`]:
//!
//! - `COINGECKO_API_URL` (default `https://api.coingecko.com/api/v3`)
//! - `CACHE_TTL_SECS` (60), `BROADCAST_INTERVAL_SECS` (5)
//! - `DEFAULT_COIN_LIMIT` (20), `VS_CURRENCY` (`usd`)
//! - `REQUEST_TIMEOUT_SECS` (10), `SEND_TIMEOUT_MS` (1000)
//! - `HUB_BIND`, `HUB_PORT`

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod constants;
pub mod error;
pub mod metrics;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod routes;
pub mod state;
pub mod types;
pub mod ws;

// Re-export commonly used types
pub use broadcast::Broadcaster;
pub use cache::{Freshness, RefreshCache, SnapshotRead};
pub use config::HubConfig;
pub use error::{ApiError, FailureKind, ProviderError, SendError};
pub use metrics::ProviderMetrics;
pub use provider::MarketDataProvider;
pub use registry::{BroadcastReport, SubscriberId, SubscriberRegistry};
pub use state::AppState;
pub use types::{CoinRecord, ComponentHealth, HealthStatus, MarketQuery, Snapshot};
