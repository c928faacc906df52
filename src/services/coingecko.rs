use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::FetchError;
use crate::models::coin::RawMarketCoin;

/// CoinGecko caps `/coins/markets` at 250 rows per page.
pub const MAX_PER_PAGE: usize = 250;

/// Anything that can hand back raw market rows ordered by market cap.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_markets(
        &self,
        vs_currency: &str,
        target_size: usize,
    ) -> Result<Vec<RawMarketCoin>, FetchError>;
}

#[derive(Clone)]
pub struct CoinGeckoService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    page_delay: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    max_retry_wait: Duration,
}

impl CoinGeckoService {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            api_key: config.coingecko_api_key.clone(),
            base_url: config.coingecko_base_url.clone(),
            page_delay: config.page_delay,
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
            max_retry_wait: config.max_retry_wait,
        })
    }

    /// Fetch the top `target_size` coins, following pagination.
    ///
    /// Stops early when the API runs out of rows. Any page that still fails after
    /// retries fails the whole fetch.
    pub async fn fetch_coins_markets(
        &self,
        vs_currency: &str,
        target_size: usize,
    ) -> Result<Vec<RawMarketCoin>, FetchError> {
        let pages = pages_needed(target_size);
        tracing::info!(
            "Fetching {} coins ({} pages) in {} from CoinGecko",
            target_size,
            pages,
            vs_currency
        );

        let mut all_coins = Vec::with_capacity(target_size);

        for page in 1..=pages {
            let coins = self.fetch_page_with_retry(vs_currency, page).await?;
            let page_len = coins.len();
            all_coins.extend(coins);

            tracing::debug!("Page {}/{}: {} coins (total {})", page, pages, page_len, all_coins.len());

            if page_len < MAX_PER_PAGE || all_coins.len() >= target_size {
                break;
            }

            // Rate limiting
            if !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }
        }

        all_coins.truncate(target_size);
        tracing::info!("Fetched {} coins from CoinGecko", all_coins.len());

        Ok(all_coins)
    }

    /// Retry transient page failures with exponential backoff
    async fn fetch_page_with_retry(
        &self,
        vs_currency: &str,
        page: usize,
    ) -> Result<Vec<RawMarketCoin>, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_page(vs_currency, page).await {
                Ok(coins) => return Ok(coins),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let delay = match &e {
                        FetchError::RateLimited {
                            retry_after_secs: Some(secs),
                            ..
                        } => Duration::from_secs(*secs),
                        _ => backoff_delay(self.retry_base_delay, attempt).min(self.max_retry_wait),
                    };
                    // The caller holds the fetch lock, so never park on a long Retry-After
                    if delay > self.max_retry_wait {
                        tracing::warn!(
                            "Page {} asked to wait {:?}, over the {:?} limit. Giving up",
                            page,
                            delay,
                            self.max_retry_wait
                        );
                        return Err(e);
                    }
                    attempt += 1;
                    tracing::warn!(
                        "Retry {}/{} for page {}: {}. Waiting {:?}",
                        attempt,
                        self.max_retries,
                        page,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::error!("Failed to fetch page {}: {}", page, e);
                    return Err(e);
                }
            }
        }
    }

    async fn fetch_page(&self, vs_currency: &str, page: usize) -> Result<Vec<RawMarketCoin>, FetchError> {
        let url = format!("{}/coins/markets", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .query(&[
                ("vs_currency", vs_currency),
                ("order", "market_cap_desc"),
                ("per_page", &MAX_PER_PAGE.to_string()),
                ("page", &page.to_string()),
                ("sparkline", "false"),
            ]);

        if let Some(key) = &self.api_key {
            request = request.header(api_key_header(&self.base_url), key);
        }

        let response = request
            .send()
            .await
            .map_err(|source| FetchError::Network { page, source })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(FetchError::RateLimited { page, retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                page,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Vec<RawMarketCoin>>()
            .await
            .map_err(|source| FetchError::Decode { page, source })
    }
}

#[async_trait]
impl MarketDataSource for CoinGeckoService {
    async fn fetch_markets(
        &self,
        vs_currency: &str,
        target_size: usize,
    ) -> Result<Vec<RawMarketCoin>, FetchError> {
        self.fetch_coins_markets(vs_currency, target_size).await
    }
}

pub fn pages_needed(target_size: usize) -> usize {
    target_size.div_ceil(MAX_PER_PAGE)
}

/// Pro keys go in `x-cg-pro-api-key`, demo keys in `x-cg-demo-api-key`.
fn api_key_header(base_url: &str) -> &'static str {
    if base_url.contains("pro-api.coingecko.com") {
        "x-cg-pro-api-key"
    } else {
        "x-cg-demo-api-key"
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}
