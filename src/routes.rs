//! HTTP request handlers
//!
//! `/price`, `/history` and `/top-coins` go straight to the provider and
//! surface upstream failures. `/prices` reads the shared cache and always
//! answers with the last good snapshot.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::constants::{DEFAULT_COIN_LIMIT, MAX_COIN_LIMIT, MAX_HISTORY_DAYS};
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{CoinListing, HealthStatus, MarketChart, MarketQuery, SimplePrice};
use crate::ws;

/// Assemble the full application router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/price/:coin_id", get(price))
        .route("/history/:coin_id", get(history))
        .route("/top-coins", get(top_coins))
        .route("/top-coins/", get(top_coins))
        .route("/prices", get(prices))
        .route("/health", get(health))
        .route("/ws/prices", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct PriceParams {
    vs_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    #[serde(default = "default_days")]
    days: u32,
    vs_currency: Option<String>,
}

fn default_days() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
struct TopCoinsParams {
    #[serde(default = "default_limit")]
    limit: u32,
    vs_currency: Option<String>,
}

fn default_limit() -> u32 {
    DEFAULT_COIN_LIMIT
}

/// CoinGecko ids are lowercase slugs (`bitcoin`, `usd-coin`). Anything else
/// would end up spliced into the upstream URL path.
fn validate_coin_id(coin_id: &str) -> Result<&str, ApiError> {
    let valid = !coin_id.is_empty()
        && coin_id.len() <= 128
        && coin_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(coin_id)
    } else {
        Err(ApiError::bad_request(format!("invalid coin id: {coin_id:?}")))
    }
}

fn resolve_currency(state: &AppState, requested: Option<String>) -> Result<String, ApiError> {
    let currency = requested
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| state.config.vs_currency.clone());

    if currency.len() <= 16 && currency.chars().all(|c| c.is_ascii_alphanumeric()) {
        Ok(currency)
    } else {
        Err(ApiError::bad_request(format!("invalid vs_currency: {currency:?}")))
    }
}

/// GET /price/:coin_id: spot price, market cap and 24h change.
async fn price(
    State(state): State<Arc<AppState>>,
    Path(coin_id): Path<String>,
    Query(params): Query<PriceParams>,
) -> Result<Json<SimplePrice>, ApiError> {
    let coin_id = validate_coin_id(&coin_id)?;
    let currency = resolve_currency(&state, params.vs_currency)?;

    let price = state.provider.fetch_simple_price(coin_id, &currency).await?;
    Ok(Json(price))
}

/// GET /history/:coin_id?days=1: price, market cap and volume series.
async fn history(
    State(state): State<Arc<AppState>>,
    Path(coin_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<MarketChart>, ApiError> {
    let coin_id = validate_coin_id(&coin_id)?;
    if !(1..=MAX_HISTORY_DAYS).contains(&params.days) {
        return Err(ApiError::bad_request(format!(
            "days must be between 1 and {MAX_HISTORY_DAYS}"
        )));
    }
    let currency = resolve_currency(&state, params.vs_currency)?;

    let chart = state
        .provider
        .fetch_market_chart(coin_id, &currency, params.days)
        .await?;
    Ok(Json(chart))
}

/// GET /top-coins?limit=20: `[{id, name}]` by market cap.
async fn top_coins(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TopCoinsParams>,
) -> Result<Json<Vec<CoinListing>>, ApiError> {
    if !(1..=MAX_COIN_LIMIT).contains(&params.limit) {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_COIN_LIMIT}"
        )));
    }

    let currency = resolve_currency(&state, params.vs_currency)?;
    let coins = state
        .provider
        .fetch_markets(&MarketQuery::listing(params.limit, &currency))
        .await?;
    Ok(Json(coins.iter().map(CoinListing::from).collect()))
}

/// GET /prices: cached top-N snapshot, stale-but-valid.
async fn prices(State(state): State<Arc<AppState>>) -> Json<Value> {
    let read = state.cache.get_snapshot(state.cache.ttl()).await;

    Json(json!({
        "coins": &read.snapshot.coins,
        "fetched_at": read.snapshot.fetched_at,
        "stale": read.is_stale(),
    }))
}

/// GET /health: cache freshness, upstream metrics and subscriber count.
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let cache = state.cache.health_check().await;
    let status = match cache.status {
        HealthStatus::Healthy => "ok",
        HealthStatus::Degraded => "degraded",
        HealthStatus::Unhealthy => "unavailable",
    };

    Json(json!({
        "status": status,
        "subscribers": state.registry.len(),
        "refreshing": state.cache.is_refreshing(),
        "cache": cache,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HubConfig;
    use crate::error::ProviderError;
    use crate::provider::mock::{coins, MockProvider};
    use crate::types::ChartPoint;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::collections::HashMap;
    use tower::ServiceExt;

    fn test_app(provider: &Arc<MockProvider>) -> (Arc<AppState>, Router) {
        let state = AppState::with_provider(HubConfig::default(), provider.clone());
        (Arc::clone(&state), app(state))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_price_passes_upstream_payload_through() {
        let provider = Arc::new(MockProvider::new());
        let mut quote = HashMap::new();
        quote.insert("usd".to_string(), Some(67000.0));
        quote.insert("usd_24h_change".to_string(), Some(-1.5));
        let mut quotes = HashMap::new();
        quotes.insert("bitcoin".to_string(), quote);
        provider.set_simple_price(SimplePrice { quotes });
        let (_, app) = test_app(&provider);

        let (status, body) = get(app, "/price/bitcoin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bitcoin"]["usd"], json!(67000.0));
        assert_eq!(body["bitcoin"]["usd_24h_change"], json!(-1.5));
    }

    #[tokio::test]
    async fn test_price_surfaces_upstream_failure() {
        // Mock answers simple price with 429 when nothing is scripted
        let provider = Arc::new(MockProvider::new());
        let (_, app) = test_app(&provider);

        let (status, body) = get(app, "/price/bitcoin").await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["error"].as_str().unwrap().contains("Rate limit"));
    }

    #[tokio::test]
    async fn test_invalid_coin_id_rejected_before_upstream() {
        let provider = Arc::new(MockProvider::new());
        let (_, app) = test_app(&provider);

        let (status, _) = get(app, "/history/bit%3Fcoin").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_history_defaults_and_bounds() {
        let provider = Arc::new(MockProvider::new());
        provider.set_chart(MarketChart {
            prices: vec![ChartPoint(1_711_929_600_000, 70_000.0)],
            ..MarketChart::default()
        });
        let (_, app) = test_app(&provider);

        let (status, body) = get(app.clone(), "/history/bitcoin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prices"][0], json!([1_711_929_600_000i64, 70_000.0]));

        let (status, _) = get(app, "/history/bitcoin?days=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_history_unknown_coin_is_not_found() {
        let provider = Arc::new(MockProvider::new());
        let (_, app) = test_app(&provider);

        let (status, _) = get(app, "/history/not-a-coin?days=7").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_top_coins_returns_id_and_name_only() {
        let provider = Arc::new(MockProvider::new());
        provider.push_markets(coins(3));
        let (_, app) = test_app(&provider);

        let (status, body) = get(app, "/top-coins/?limit=3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {"id": "coin-1", "name": "COIN-1"},
                {"id": "coin-2", "name": "COIN-2"},
                {"id": "coin-3", "name": "COIN-3"},
            ])
        );
        let query = provider.last_query().unwrap();
        assert_eq!(query.per_page, 3);
        assert!(!query.include_24h_change);
    }

    #[tokio::test]
    async fn test_top_coins_uses_configured_currency() {
        let provider = Arc::new(MockProvider::new());
        provider.push_markets(coins(1));
        provider.push_markets(coins(1));
        let config = HubConfig {
            vs_currency: "eur".to_string(),
            ..HubConfig::default()
        };
        let state = AppState::with_provider(config, provider.clone());
        let app = app(state);

        let (status, _) = get(app.clone(), "/top-coins?limit=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(provider.last_query().unwrap().vs_currency, "eur");

        let (status, _) = get(app, "/top-coins?limit=1&vs_currency=JPY").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(provider.last_query().unwrap().vs_currency, "jpy");
    }

    #[tokio::test]
    async fn test_top_coins_limit_bounds() {
        let provider = Arc::new(MockProvider::new());
        let (_, app) = test_app(&provider);

        let (status, _) = get(app.clone(), "/top-coins?limit=0").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = get(app, "/top-coins?limit=251").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(provider.market_calls(), 0);
    }

    #[tokio::test]
    async fn test_prices_served_from_cache() {
        let provider = Arc::new(MockProvider::new());
        provider.push_markets(coins(20));
        let (state, app) = test_app(&provider);

        let (status, body) = get(app.clone(), "/prices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coins"].as_array().unwrap().len(), 20);
        assert_eq!(body["stale"], json!(false));

        // Served from cache: no second fetch
        get(app, "/prices").await;
        assert_eq!(provider.market_calls(), 1);
        assert_eq!(state.cache.current().len(), 20);
    }

    #[tokio::test]
    async fn test_prices_cold_start_outage_is_empty_not_error() {
        let provider = Arc::new(MockProvider::new());
        provider.push_error(ProviderError::malformed("html error page"));
        let (_, app) = test_app(&provider);

        let (status, body) = get(app, "/prices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["coins"], json!([]));
        assert_eq!(body["stale"], json!(true));
        assert!(body["fetched_at"].is_null());
    }

    #[tokio::test]
    async fn test_health_reports_subscribers() {
        let provider = Arc::new(MockProvider::new());
        let (state, app) = test_app(&provider);
        let (tx, _rx) = crate::registry::subscriber_channel();
        state.registry.register(tx);

        let (status, body) = get(app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("unavailable"));
        assert_eq!(body["subscribers"], json!(1));
        assert_eq!(body["cache"]["name"], json!("refresh_cache"));
    }

    #[test]
    fn test_validate_coin_id() {
        assert!(validate_coin_id("usd-coin").is_ok());
        assert!(validate_coin_id("").is_err());
        assert!(validate_coin_id("../coins").is_err());
        assert!(validate_coin_id("a b").is_err());
    }
}
