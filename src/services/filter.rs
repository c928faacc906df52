use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::coin::CoinRecord;

/// Inclusive numeric range; an unset end is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ValueRange {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        Self { min, max }
    }

    pub fn is_active(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    fn validate(&self, label: &str) -> Result<(), String> {
        for bound in [self.min, self.max].into_iter().flatten() {
            if !bound.is_finite() || bound < 0.0 {
                return Err(format!("{} bounds must be finite and non-negative, got: {}", label, bound));
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return Err(format!("{} min ({}) must not exceed max ({})", label, min, max));
            }
        }
        Ok(())
    }
}

/// Inclusive calendar-year range; an unset end is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub from: Option<i32>,
    pub to: Option<i32>,
}

impl YearRange {
    pub fn new(from: Option<i32>, to: Option<i32>) -> Self {
        Self { from, to }
    }

    pub fn is_active(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn contains(&self, year: i32) -> bool {
        self.from.is_none_or(|from| year >= from) && self.to.is_none_or(|to| year <= to)
    }

    fn validate(&self, label: &str) -> Result<(), String> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(format!("{} year range is inverted: {} > {}", label, from, to));
            }
        }
        Ok(())
    }
}

/// The sidebar selections, as one immutable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    pub market_cap: ValueRange,
    pub price: ValueRange,
    pub ath_years: YearRange,
    pub atl_years: YearRange,
    pub search: Option<String>,
}

impl FilterParams {
    pub fn validate(&self) -> Result<(), String> {
        self.market_cap.validate("market cap")?;
        self.price.validate("price")?;
        self.ath_years.validate("ATH")?;
        self.atl_years.validate("ATL")?;
        Ok(())
    }

    /// Lowercased search needle, `None` when the box is blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, coin: &CoinRecord) -> bool {
        self.matches_with_term(coin, self.search_term().as_deref())
    }

    fn matches_with_term(&self, coin: &CoinRecord, term: Option<&str>) -> bool {
        // Missing cap and price count as zero
        if self.market_cap.is_active() && !self.market_cap.contains(coin.market_cap.unwrap_or(0.0)) {
            return false;
        }
        if self.price.is_active() && !self.price.contains(coin.current_price.unwrap_or(0.0)) {
            return false;
        }
        if self.ath_years.is_active() && !coin.ath_year().is_some_and(|y| self.ath_years.contains(y)) {
            return false;
        }
        if self.atl_years.is_active() && !coin.atl_year().is_some_and(|y| self.atl_years.contains(y)) {
            return false;
        }
        if let Some(term) = term {
            let in_name = coin.name.to_lowercase().contains(term);
            let in_symbol = coin.symbol.to_lowercase().contains(term);
            if !in_name && !in_symbol {
                return false;
            }
        }
        true
    }
}

/// Rows passing every active filter, in table order.
pub fn apply_filters<'a>(coins: &'a [CoinRecord], params: &FilterParams) -> Vec<&'a CoinRecord> {
    let term = params.search_term();
    coins
        .iter()
        .filter(|coin| params.matches_with_term(coin, term.as_deref()))
        .collect()
}

/// Slider limits for the sidebar, taken from the unfiltered table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterBounds {
    pub market_cap_min: Option<f64>,
    pub market_cap_max: Option<f64>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub ath_years: Vec<i32>,
    pub atl_years: Vec<i32>,
}

pub fn filter_bounds(coins: &[CoinRecord]) -> FilterBounds {
    let (market_cap_min, market_cap_max) = min_max(coins.iter().filter_map(|c| c.market_cap));
    let (price_min, price_max) = min_max(coins.iter().filter_map(|c| c.current_price));
    let ath_years: BTreeSet<i32> = coins.iter().filter_map(CoinRecord::ath_year).collect();
    let atl_years: BTreeSet<i32> = coins.iter().filter_map(CoinRecord::atl_year).collect();

    FilterBounds {
        market_cap_min,
        market_cap_max,
        price_min,
        price_max,
        ath_years: ath_years.into_iter().collect(),
        atl_years: atl_years.into_iter().collect(),
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (Option<f64>, Option<f64>) {
    values.fold((None, None), |(lo, hi), v| {
        (
            Some(lo.map_or(v, |lo: f64| lo.min(v))),
            Some(hi.map_or(v, |hi: f64| hi.max(v))),
        )
    })
}
