//! Runtime configuration
//!
//! Every field defaults to the matching value in `constants` and can be
//! overridden by an environment variable.

use crate::constants::{
    BROADCAST_INTERVAL_SECS, CACHE_TTL_SECS, COINGECKO_API_URL, DEFAULT_BIND, DEFAULT_COIN_LIMIT,
    DEFAULT_PORT, DEFAULT_VS_CURRENCY, MAX_COIN_LIMIT, REQUEST_TIMEOUT_SECS, SEND_TIMEOUT_MS,
};
use std::env;
use std::time::Duration;

/// Hub configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct HubConfig {
    pub bind: String,
    pub port: u16,

    /// Upstream base URL, without trailing slash.
    pub api_url: String,
    pub request_timeout: Duration,

    pub cache_ttl: Duration,
    pub broadcast_interval: Duration,
    pub send_timeout: Duration,

    /// Size of the cached top-N snapshot.
    pub coin_limit: u32,
    pub vs_currency: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            api_url: COINGECKO_API_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            cache_ttl: Duration::from_secs(CACHE_TTL_SECS),
            broadcast_interval: Duration::from_secs(BROADCAST_INTERVAL_SECS),
            send_timeout: Duration::from_millis(SEND_TIMEOUT_MS),
            coin_limit: DEFAULT_COIN_LIMIT,
            vs_currency: DEFAULT_VS_CURRENCY.to_string(),
        }
    }
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Positive integer from the environment; zero counts as unset.
fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .filter(|v: &u64| *v > 0)
        .unwrap_or(default)
}

impl HubConfig {
    pub fn from_env() -> Self {
        let api_url = env_str("COINGECKO_API_URL", COINGECKO_API_URL)
            .trim_end_matches('/')
            .to_string();

        let coin_limit = env_u64("DEFAULT_COIN_LIMIT", DEFAULT_COIN_LIMIT as u64)
            .min(MAX_COIN_LIMIT as u64) as u32;

        Self {
            bind: env_str("HUB_BIND", DEFAULT_BIND),
            port: env_u16("HUB_PORT", DEFAULT_PORT),
            api_url,
            request_timeout: Duration::from_secs(env_u64(
                "REQUEST_TIMEOUT_SECS",
                REQUEST_TIMEOUT_SECS,
            )),
            cache_ttl: Duration::from_secs(env_u64("CACHE_TTL_SECS", CACHE_TTL_SECS)),
            broadcast_interval: Duration::from_secs(env_u64(
                "BROADCAST_INTERVAL_SECS",
                BROADCAST_INTERVAL_SECS,
            )),
            send_timeout: Duration::from_millis(env_u64("SEND_TIMEOUT_MS", SEND_TIMEOUT_MS)),
            coin_limit,
            vs_currency: env_str("VS_CURRENCY", DEFAULT_VS_CURRENCY).to_lowercase(),
        }
    }
}
