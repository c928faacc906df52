#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use crypto_analytics::{
    config::AppConfig,
    error::FetchError,
    models::coin::RawMarketCoin,
    services::{coingecko::MarketDataSource, dataset::DatasetService},
    AppState,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Synthetic `/coins/markets` row for rank `i + 1`.
///
/// Every 7th coin is named "Bit Asset", every 11th has an "xbit" symbol and
/// every 13th (offset 3) is an "Orbital" coin, so a "bit" search has hits in
/// names, symbols and the middle of words.
pub fn market_json(i: usize) -> Value {
    let rank = i + 1;
    let (name, symbol) = if i % 7 == 0 {
        (format!("Bit Asset {}", i), format!("ba{}", i))
    } else if i % 11 == 0 {
        (format!("Token {}", i), format!("XBIT{}", i))
    } else if i % 13 == 3 {
        (format!("Orbital {}", i), format!("orb{}", i))
    } else {
        (format!("Token {}", i), format!("tk{}", i))
    };

    let total_supply = match i % 5 {
        0 => Value::Null,
        1 => json!(0),
        _ => json!(2_000_000.0 * rank as f64),
    };

    json!({
        "id": format!("coin-{}", i),
        "symbol": symbol,
        "name": name,
        "image": format!("https://assets.example.com/{}.png", i),
        "current_price": 50_000.0 / rank as f64,
        "market_cap": 1.5e12 / rank as f64,
        "market_cap_rank": rank,
        "total_volume": 7.5e10 / rank as f64,
        "circulating_supply": 1_000_000.0 * rank as f64,
        "total_supply": total_supply,
        "ath": 60_000.0 / rank as f64,
        "ath_change_percentage": -((i % 90) as f64) - 0.5,
        "ath_date": format!("{}-11-10T14:24:11.849Z", 2017 + i % 8),
        "atl": 1.0 / rank as f64,
        "atl_change_percentage": ((i * 37) % 5000) as f64,
        "atl_date": format!("{}-07-06T00:00:00.000Z", 2013 + i % 5),
    })
}

pub fn raw_coins(count: usize) -> Vec<RawMarketCoin> {
    (0..count)
        .map(|i| serde_json::from_value(market_json(i)).unwrap())
        .collect()
}

/// In-memory source holding `available` coins
pub struct StaticSource {
    pub available: usize,
    pub calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(available: usize) -> Self {
        Self {
            available,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MarketDataSource for StaticSource {
    async fn fetch_markets(&self, _vs: &str, target_size: usize) -> Result<Vec<RawMarketCoin>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(raw_coins(target_size.min(self.available)))
    }
}

/// Succeeds until `fail` is switched on
pub struct FlakySource {
    pub inner: StaticSource,
    pub fail: AtomicBool,
    pub rate_limited: bool,
}

impl FlakySource {
    pub fn failing(rate_limited: bool) -> Self {
        Self {
            inner: StaticSource::new(10_000),
            fail: AtomicBool::new(true),
            rate_limited,
        }
    }

    pub fn healthy() -> Self {
        Self {
            inner: StaticSource::new(10_000),
            fail: AtomicBool::new(false),
            rate_limited: false,
        }
    }
}

#[async_trait]
impl MarketDataSource for FlakySource {
    async fn fetch_markets(&self, vs: &str, target_size: usize) -> Result<Vec<RawMarketCoin>, FetchError> {
        if self.fail.load(Ordering::SeqCst) {
            if self.rate_limited {
                return Err(FetchError::RateLimited {
                    page: 1,
                    retry_after_secs: None,
                });
            }
            return Err(FetchError::Status {
                page: 3,
                status: 503,
                body: "upstream unavailable".to_string(),
            });
        }
        self.inner.fetch_markets(vs, target_size).await
    }
}

/// Config pointing at `base_url` with no retries or page delay
pub fn test_config(base_url: &str) -> AppConfig {
    AppConfig {
        coingecko_base_url: base_url.to_string(),
        page_delay: Duration::ZERO,
        max_retries: 0,
        retry_base_delay: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        prefetch_on_start: false,
        ..AppConfig::default()
    }
}

pub fn test_state(source: Arc<dyn MarketDataSource>) -> AppState {
    AppState {
        config: Arc::new(test_config("http://127.0.0.1:9")),
        datasets: DatasetService::new(source, Duration::from_secs(60)),
    }
}

/// Behaviour of the local `/coins/markets` stand-in
#[derive(Default)]
pub struct MockMarket {
    pub total: usize,
    pub fail_page: Option<usize>,
    pub rate_limit: bool,
    /// Retry-After sent with 429s, 1 second when unset
    pub retry_after_secs: Option<u64>,
    pub requests: AtomicUsize,
    pub seen_params: Mutex<Vec<HashMap<String, String>>>,
}

impl MockMarket {
    pub fn with_total(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }
}

async fn markets(
    State(mock): State<Arc<MockMarket>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    mock.requests.fetch_add(1, Ordering::SeqCst);
    mock.seen_params.lock().push(params.clone());

    let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
    let per_page: usize = params.get("per_page").and_then(|p| p.parse().ok()).unwrap_or(100);

    if mock.rate_limit {
        let retry_after = mock.retry_after_secs.unwrap_or(1).to_string();
        return (StatusCode::TOO_MANY_REQUESTS, [("retry-after", retry_after)], "slow down").into_response();
    }
    if mock.fail_page == Some(page) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }

    let start = (page.saturating_sub(1) * per_page).min(mock.total);
    let end = (start + per_page).min(mock.total);
    let rows: Vec<Value> = (start..end).map(market_json).collect();
    Json(rows).into_response()
}

/// Serve `mock` on an ephemeral port; returns the API base URL.
pub async fn spawn_mock_coingecko(mock: Arc<MockMarket>) -> String {
    let app = Router::new()
        .route("/api/v3/coins/markets", get(markets))
        .with_state(mock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/api/v3", addr)
}
