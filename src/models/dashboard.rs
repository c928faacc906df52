use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::services::analytics::{
    ChartOptions, DashboardTabs, DisplayMode, KpiCard, Kpis, TableRow, DEFAULT_TOP_N, MAX_TOP_N, MIN_TOP_N,
};
use crate::services::dataset::{DatasetKey, ALLOWED_SIZES, SUPPORTED_CURRENCIES};
use crate::services::filter::{FilterBounds, FilterParams, ValueRange, YearRange};

/// Query parameters shared by the dashboard endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardQuery {
    pub vs_currency: Option<String>, // Default: from config
    pub size: Option<usize>,         // 500 | 1000 | 5000 | 10000
    pub mc_min: Option<f64>,
    pub mc_max: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub ath_from: Option<i32>,
    pub ath_to: Option<i32>,
    pub atl_from: Option<i32>,
    pub atl_to: Option<i32>,
    pub search: Option<String>,
    pub top_n: Option<usize>,        // Default: 10, range 5-50
    pub supply_top_n: Option<usize>, // Default: 10, range 5-50
    pub viewport_width: Option<u32>,
    pub mobile: Option<bool>,
}

impl DashboardQuery {
    /// Validates query parameters
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref currency) = self.vs_currency {
            let normalized = currency.trim().to_lowercase();
            if !SUPPORTED_CURRENCIES.contains(&normalized.as_str()) {
                return Err(format!(
                    "Unsupported vs_currency: '{}'. Expected one of {:?}",
                    currency, SUPPORTED_CURRENCIES
                ));
            }
        }

        if let Some(size) = self.size {
            if !ALLOWED_SIZES.contains(&size) {
                return Err(format!("size must be one of {:?}, got: {}", ALLOWED_SIZES, size));
            }
        }

        for (name, value) in [("top_n", self.top_n), ("supply_top_n", self.supply_top_n)] {
            if let Some(n) = value {
                if !(MIN_TOP_N..=MAX_TOP_N).contains(&n) {
                    return Err(format!(
                        "{} must be between {} and {}, got: {}",
                        name, MIN_TOP_N, MAX_TOP_N, n
                    ));
                }
            }
        }

        self.filter_params().validate()
    }

    pub fn dataset_key(&self, config: &AppConfig) -> DatasetKey {
        let vs_currency = self
            .vs_currency
            .as_deref()
            .map(|c| c.trim().to_lowercase())
            .unwrap_or_else(|| config.default_vs_currency.clone());
        DatasetKey::new(vs_currency, self.size.unwrap_or(config.default_target_size))
    }

    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            market_cap: ValueRange::new(self.mc_min, self.mc_max),
            price: ValueRange::new(self.price_min, self.price_max),
            ath_years: YearRange::new(self.ath_from, self.ath_to),
            atl_years: YearRange::new(self.atl_from, self.atl_to),
            search: self.search.clone(),
        }
    }

    pub fn chart_options(&self) -> ChartOptions {
        ChartOptions {
            top_n: self.top_n.unwrap_or(DEFAULT_TOP_N),
            supply_top_n: self.supply_top_n.unwrap_or(DEFAULT_TOP_N),
        }
    }

    pub fn display_mode(&self) -> DisplayMode {
        DisplayMode::select(self.viewport_width, self.mobile)
    }
}

/// What was loaded, shown in the dashboard caption.
///
/// `vs_currency` and `requested` describe the table actually served. During a
/// stale fallback that can be an earlier key than `query_vs_currency`/`query_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub vs_currency: String,
    pub requested: usize,
    pub query_vs_currency: String,
    pub query_size: usize,
    pub fetched: usize,
    pub unique: usize,
    pub filtered: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub cached: bool,
    pub stale: bool,
}

/// Response structure for GET /api/dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub meta: DatasetMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub display_mode: DisplayMode,
    pub kpis: Kpis,
    pub kpi_cards: Vec<KpiCard>,
    pub bounds: FilterBounds,
    pub tabs: DashboardTabs,
}

/// Response structure for GET /api/coins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoinsResponse {
    pub meta: DatasetMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub coins: Vec<TableRow>,
}

/// Response structure for GET /api/kpis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KpiResponse {
    pub meta: DatasetMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub display_mode: DisplayMode,
    pub kpis: Kpis,
    pub kpi_cards: Vec<KpiCard>,
}

/// Response structure for GET /api/filters/bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundsResponse {
    pub meta: DatasetMeta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub bounds: FilterBounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    pub cleared: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
