use chrono::{DateTime, Utc};
use moka::future::Cache;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::FetchError;
use crate::models::coin::CoinRecord;
use crate::services::cleaner::clean_coins;
use crate::services::coingecko::MarketDataSource;

pub const ALLOWED_SIZES: [usize; 4] = [500, 1000, 5000, 10000];
pub const SUPPORTED_CURRENCIES: [&str; 5] = ["usd", "inr", "eur", "gbp", "jpy"];

const CACHE_CAPACITY: u64 = 20;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub vs_currency: String,
    pub target_size: usize,
}

impl DatasetKey {
    pub fn new(vs_currency: impl Into<String>, target_size: usize) -> Self {
        Self {
            vs_currency: vs_currency.into(),
            target_size,
        }
    }
}

/// A cleaned table, as produced by one fetch.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub key: DatasetKey,
    pub coins: Vec<CoinRecord>,
    /// Rows returned by the API before cleaning.
    pub raw_count: usize,
    pub fetched_at: DateTime<Utc>,
}

/// Result of asking for a dataset.
///
/// `dataset` is `None` only when the fetch failed and nothing was loaded before.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub dataset: Option<Arc<Dataset>>,
    pub error: Option<Arc<FetchError>>,
    pub cached: bool,
}

impl LoadOutcome {
    /// Data is being served from an earlier load because this one failed.
    pub fn is_stale(&self) -> bool {
        self.error.is_some() && self.dataset.is_some()
    }
}

/// Holds the in-memory table between requests.
#[derive(Clone)]
pub struct DatasetService {
    source: Arc<dyn MarketDataSource>,
    cache: Cache<DatasetKey, Arc<Dataset>>,
    last_good: Arc<RwLock<Option<Arc<Dataset>>>>,
    fetch_lock: Arc<Mutex<()>>,
}

impl DatasetService {
    pub fn new(source: Arc<dyn MarketDataSource>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(ttl)
            .build();

        Self {
            source,
            cache,
            last_good: Arc::new(RwLock::new(None)),
            fetch_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Cached table for `key`, fetching and cleaning it on a miss.
    ///
    /// On fetch failure the last good table (if any) is returned with the error.
    pub async fn load(&self, key: &DatasetKey) -> LoadOutcome {
        if let Some(dataset) = self.cache.get(key).await {
            tracing::debug!("Cache hit for {}_{}", key.vs_currency, key.target_size);
            return LoadOutcome {
                dataset: Some(dataset),
                error: None,
                cached: true,
            };
        }

        // One upstream fetch at a time
        let _guard = self.fetch_lock.lock().await;

        if let Some(dataset) = self.cache.get(key).await {
            tracing::debug!("Loaded {}_{} while waiting for fetch lock", key.vs_currency, key.target_size);
            return LoadOutcome {
                dataset: Some(dataset),
                error: None,
                cached: true,
            };
        }

        match self.source.fetch_markets(&key.vs_currency, key.target_size).await {
            Ok(raw) => {
                let coins = clean_coins(&raw);
                tracing::info!(
                    "Loaded {} dataset: requested {}, fetched {}, unique after cleaning {}",
                    key.vs_currency,
                    key.target_size,
                    raw.len(),
                    coins.len()
                );

                let dataset = Arc::new(Dataset {
                    key: key.clone(),
                    coins,
                    raw_count: raw.len(),
                    fetched_at: Utc::now(),
                });
                self.cache.insert(key.clone(), dataset.clone()).await;
                *self.last_good.write() = Some(dataset.clone());

                LoadOutcome {
                    dataset: Some(dataset),
                    error: None,
                    cached: false,
                }
            }
            Err(e) => {
                let previous = self.last_good.read().clone();
                match &previous {
                    Some(prev) => tracing::warn!(
                        "Fetch for {}_{} failed, serving previous {}_{} table: {}",
                        key.vs_currency,
                        key.target_size,
                        prev.key.vs_currency,
                        prev.key.target_size,
                        e
                    ),
                    None => tracing::error!(
                        "Fetch for {}_{} failed with no previous table: {}",
                        key.vs_currency,
                        key.target_size,
                        e
                    ),
                }

                LoadOutcome {
                    dataset: previous,
                    error: Some(Arc::new(e)),
                    cached: false,
                }
            }
        }
    }

    /// Drop every cached table; the next request refetches.
    ///
    /// The last good table is kept as the fallback for a failing refetch.
    pub async fn refresh(&self) {
        self.cache.run_pending_tasks().await;
        let dropped = self.cached_entries();
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        tracing::info!("Dataset cache cleared ({} tables dropped)", dropped);
    }

    pub fn cached_entries(&self) -> u64 {
        self.cache.entry_count()
    }
}
