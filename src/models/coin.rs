use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One element of the CoinGecko `/coins/markets` response.
///
/// Fields stay as loose JSON so the cleaner decides what is usable. This is the
/// only type that knows the upstream field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMarketCoin {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub symbol: Value,
    #[serde(default)]
    pub name: Value,
    #[serde(default)]
    pub image: Value,
    #[serde(default)]
    pub current_price: Value,
    #[serde(default)]
    pub market_cap: Value,
    #[serde(default)]
    pub market_cap_rank: Value,
    #[serde(default)]
    pub total_volume: Value,
    #[serde(default)]
    pub circulating_supply: Value,
    #[serde(default)]
    pub total_supply: Value,
    #[serde(default)]
    pub ath: Value,
    #[serde(default)]
    pub ath_change_percentage: Value,
    #[serde(default)]
    pub ath_date: Value,
    #[serde(default)]
    pub atl: Value,
    #[serde(default)]
    pub atl_change_percentage: Value,
    #[serde(default)]
    pub atl_date: Value,
}

/// Normalized row of the dashboard table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinRecord {
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub total_volume: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub ath: Option<f64>,
    pub ath_change_percentage: Option<f64>,
    pub ath_date: Option<DateTime<Utc>>,
    pub atl: Option<f64>,
    pub atl_change_percentage: Option<f64>,
    pub atl_date: Option<DateTime<Utc>>,
    pub supply_ratio: Option<f64>,
}

impl CoinRecord {
    pub fn ath_year(&self) -> Option<i32> {
        self.ath_date.map(|d| d.year())
    }

    pub fn ath_month(&self) -> Option<u32> {
        self.ath_date.map(|d| d.month())
    }

    pub fn atl_year(&self) -> Option<i32> {
        self.atl_date.map(|d| d.year())
    }

    pub fn atl_month(&self) -> Option<u32> {
        self.atl_date.map(|d| d.month())
    }
}

/// Back to the wire shape, so a cleaned table can be fed through the cleaner again.
impl From<&CoinRecord> for RawMarketCoin {
    fn from(coin: &CoinRecord) -> Self {
        let number = |v: Option<f64>| v.map(Value::from).unwrap_or(Value::Null);
        let date = |d: Option<DateTime<Utc>>| {
            d.map(|d| Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
                .unwrap_or(Value::Null)
        };

        RawMarketCoin {
            id: Value::String(coin.id.clone()),
            symbol: Value::String(coin.symbol.clone()),
            name: Value::String(coin.name.clone()),
            image: coin.image.clone().map(Value::String).unwrap_or(Value::Null),
            current_price: number(coin.current_price),
            market_cap: number(coin.market_cap),
            market_cap_rank: coin.market_cap_rank.map(Value::from).unwrap_or(Value::Null),
            total_volume: number(coin.total_volume),
            circulating_supply: number(coin.circulating_supply),
            total_supply: number(coin.total_supply),
            ath: number(coin.ath),
            ath_change_percentage: number(coin.ath_change_percentage),
            ath_date: date(coin.ath_date),
            atl: number(coin.atl),
            atl_change_percentage: number(coin.atl_change_percentage),
            atl_date: date(coin.atl_date),
        }
    }
}
