//! Constants for the price hub
//!
//! Compile-time defaults for every tunable. `config::HubConfig` overlays
//! environment variables on top of these at startup.

/// How long a cached snapshot is considered fresh (in seconds)
pub const CACHE_TTL_SECS: u64 = 60;

/// How often the broadcast loop pushes to subscribers (in seconds)
pub const BROADCAST_INTERVAL_SECS: u64 = 5;

/// Number of coins in the cached top-N snapshot
pub const DEFAULT_COIN_LIMIT: u32 = 20;

/// Largest page size CoinGecko accepts for `coins/markets`
pub const MAX_COIN_LIMIT: u32 = 250;

/// Largest history window accepted by the history handler (in days)
pub const MAX_HISTORY_DAYS: u32 = 3650;

/// Quote currency used when a request does not name one
pub const DEFAULT_VS_CURRENCY: &str = "usd";

/// HTTP request timeout when calling the upstream API (in seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// How long one subscriber may take to accept a broadcast (in milliseconds)
pub const SEND_TIMEOUT_MS: u64 = 1000;

/// Per-subscriber outbound queue depth
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 4;

/// CoinGecko API base URL
pub const COINGECKO_API_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko endpoint for simple price queries
pub const COINGECKO_SIMPLE_PRICE_ENDPOINT: &str = "/simple/price";

/// CoinGecko endpoint for market listings
pub const COINGECKO_MARKETS_ENDPOINT: &str = "/coins/markets";

/// Default bind host for the server binary
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default port for the server binary
pub const DEFAULT_PORT: u16 = 8000;

/// User agent for HTTP requests
pub const USER_AGENT: &str = "coin-price-hub/0.1.0";
