//! KPI and chart datasets for the dashboard tabs.
//!
//! Everything here reads the filtered view and never mutates it.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::coin::CoinRecord;

pub const DEFAULT_TOP_N: usize = 10;
pub const MIN_TOP_N: usize = 5;
pub const MAX_TOP_N: usize = 50;
pub const COMPACT_VIEWPORT_WIDTH: u32 = 768;

const MARKET_CAP_BINS: usize = 50;
const PRICE_BINS: usize = 50;
const SUPPLY_RATIO_BINS: usize = 30;
const TOP_PRICE_COUNT: usize = 15;
const ATH_ATL_COUNT: usize = 15;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub coin_count: usize,
    pub total_market_cap: f64,
    pub avg_price: Option<f64>,
    pub avg_market_cap: Option<f64>,
    pub median_supply_ratio: Option<f64>,
    pub aggregate_supply_ratio: Option<f64>,
    pub farthest_above_atl: Option<String>,
    pub top_ath_year: Option<i32>,
    pub top_atl_year: Option<i32>,
}

pub fn compute_kpis(view: &[&CoinRecord]) -> Kpis {
    let prices: Vec<f64> = view.iter().filter_map(|c| c.current_price).collect();
    let caps: Vec<f64> = view.iter().filter_map(|c| c.market_cap).collect();
    let ratios: Vec<f64> = view.iter().filter_map(|c| c.supply_ratio).collect();

    let (circulating, total) = view
        .iter()
        .filter_map(|c| match (c.circulating_supply, c.total_supply) {
            (Some(circ), Some(total)) if total > 0.0 => Some((circ, total)),
            _ => None,
        })
        .fold((0.0, 0.0), |(c_sum, t_sum), (c, t)| (c_sum + c, t_sum + t));

    let farthest_above_atl = view
        .iter()
        .filter_map(|c| c.atl_change_percentage.map(|pct| (pct, c)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.name.clone());

    Kpis {
        coin_count: view.len(),
        total_market_cap: caps.iter().sum(),
        avg_price: mean(&prices),
        avg_market_cap: mean(&caps),
        median_supply_ratio: median(&ratios),
        aggregate_supply_ratio: (total > 0.0).then(|| circulating / total),
        farthest_above_atl,
        top_ath_year: mode_year(view.iter().filter_map(|c| c.ath_year())),
        top_atl_year: mode_year(view.iter().filter_map(|c| c.atl_year())),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent year; ties go to the earliest.
fn mode_year(years: impl Iterator<Item = i32>) -> Option<i32> {
    let counts = year_counts(years);
    counts
        .iter()
        .max_by(|a, b| a.count.cmp(&b.count).then(b.year.cmp(&a.year)))
        .map(|yc| yc.year)
}

// ---------------------------------------------------------------------------
// KPI cards

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Full,
    Compact,
}

impl DisplayMode {
    /// An explicit `mobile` flag wins over the measured viewport.
    pub fn select(viewport_width: Option<u32>, mobile: Option<bool>) -> Self {
        match (mobile, viewport_width) {
            (Some(true), _) => DisplayMode::Compact,
            (Some(false), _) => DisplayMode::Full,
            (None, Some(width)) if width < COMPACT_VIEWPORT_WIDTH => DisplayMode::Compact,
            _ => DisplayMode::Full,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiCard {
    pub label: String,
    pub value: String,
}

fn card(label: &str, value: String) -> KpiCard {
    KpiCard {
        label: label.to_string(),
        value,
    }
}

pub fn kpi_cards(kpis: &Kpis, mode: DisplayMode) -> Vec<KpiCard> {
    let coins = card("Coins", kpis.coin_count.to_string());
    let total_cap = card("Total Market Cap", format_grouped(kpis.total_market_cap, 0));
    let avg_price = card("Avg Price", format_optional(kpis.avg_price, 2));
    let median_ratio = card(
        "Median Supply Ratio",
        kpis.median_supply_ratio
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "NA".to_string()),
    );

    match mode {
        DisplayMode::Compact => vec![coins, avg_price, total_cap, median_ratio],
        DisplayMode::Full => vec![
            coins,
            total_cap,
            avg_price,
            card("Avg Market Cap", format_optional(kpis.avg_market_cap, 0)),
            median_ratio,
            card(
                "Farthest above ATL",
                kpis.farthest_above_atl.clone().unwrap_or_else(|| "NA".to_string()),
            ),
        ],
    }
}

fn format_optional(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format_grouped(v, decimals))
        .unwrap_or_else(|| "NA".to_string())
}

/// `1234567.891` with 2 decimals -> `1,234,567.89`
pub fn format_grouped(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

// ---------------------------------------------------------------------------
// Chart datasets

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarDatum {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareDatum {
    pub label: String,
    pub value: f64,
    pub share_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub label: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearCount {
    pub year: i32,
    pub count: usize,
}

/// One row of the raw-table tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<u32>,
    pub total_volume: Option<f64>,
    pub supply_ratio: Option<f64>,
    pub ath: Option<f64>,
    pub atl: Option<f64>,
    pub ath_year: Option<i32>,
    pub atl_year: Option<i32>,
}

impl From<&CoinRecord> for TableRow {
    fn from(coin: &CoinRecord) -> Self {
        Self {
            symbol: coin.symbol.clone(),
            name: coin.name.clone(),
            image: coin.image.clone(),
            current_price: coin.current_price,
            market_cap: coin.market_cap,
            market_cap_rank: coin.market_cap_rank,
            total_volume: coin.total_volume,
            supply_ratio: coin.supply_ratio,
            ath: coin.ath,
            atl: coin.atl,
            ath_year: coin.ath_year(),
            atl_year: coin.atl_year(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewTab {
    pub top_n: usize,
    pub top_by_market_cap: Vec<BarDatum>,
    pub market_share: Vec<ShareDatum>,
    pub top_coins: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketShareTab {
    pub market_cap_histogram: Vec<HistogramBin>,
    pub market_cap_vs_volume: Vec<ScatterPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricesTab {
    pub price_histogram: Vec<HistogramBin>,
    pub top_by_price: Vec<BarDatum>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupplyTab {
    pub top_n: usize,
    pub supply_ratio_histogram: Vec<HistogramBin>,
    pub top_by_circulating_supply: Vec<BarDatum>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AthAtlTab {
    pub ath_years: Vec<YearCount>,
    pub atl_years: Vec<YearCount>,
    pub farthest_below_ath: Vec<BarDatum>,
    pub farthest_above_atl: Vec<BarDatum>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardTabs {
    pub overview: OverviewTab,
    pub market_share: MarketShareTab,
    pub prices: PricesTab,
    pub supply: SupplyTab,
    pub ath_atl: AthAtlTab,
    pub table: Vec<TableRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartOptions {
    pub top_n: usize,
    pub supply_top_n: usize,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            supply_top_n: DEFAULT_TOP_N,
        }
    }
}

pub fn build_tabs(view: &[&CoinRecord], options: &ChartOptions) -> DashboardTabs {
    DashboardTabs {
        overview: overview_tab(view, options.top_n),
        market_share: MarketShareTab {
            market_cap_histogram: histogram(view.iter().filter_map(|c| c.market_cap), MARKET_CAP_BINS),
            market_cap_vs_volume: view
                .iter()
                .filter_map(|c| match (c.market_cap, c.total_volume) {
                    (Some(x), Some(y)) => Some(ScatterPoint {
                        label: c.name.clone(),
                        x,
                        y,
                    }),
                    _ => None,
                })
                .collect(),
        },
        prices: PricesTab {
            price_histogram: histogram(view.iter().filter_map(|c| c.current_price), PRICE_BINS),
            top_by_price: top_bars(view, TOP_PRICE_COUNT, |c| c.current_price, Ordering::Greater),
        },
        supply: SupplyTab {
            top_n: options.supply_top_n,
            supply_ratio_histogram: histogram(view.iter().filter_map(|c| c.supply_ratio), SUPPLY_RATIO_BINS),
            top_by_circulating_supply: top_bars(
                view,
                options.supply_top_n,
                |c| c.circulating_supply,
                Ordering::Greater,
            ),
        },
        ath_atl: AthAtlTab {
            ath_years: year_counts(view.iter().filter_map(|c| c.ath_year())),
            atl_years: year_counts(view.iter().filter_map(|c| c.atl_year())),
            farthest_below_ath: top_bars(view, ATH_ATL_COUNT, |c| c.ath_change_percentage, Ordering::Less),
            farthest_above_atl: top_bars(view, ATH_ATL_COUNT, |c| c.atl_change_percentage, Ordering::Greater),
        },
        table: view.iter().map(|c| TableRow::from(*c)).collect(),
    }
}

fn overview_tab(view: &[&CoinRecord], top_n: usize) -> OverviewTab {
    let mut top: Vec<&CoinRecord> = view.to_vec();
    if view.iter().any(|c| c.market_cap_rank.is_some()) {
        top.sort_by_key(|c| c.market_cap_rank.unwrap_or(u32::MAX));
    } else {
        top.sort_by(|a, b| b.market_cap.unwrap_or(0.0).total_cmp(&a.market_cap.unwrap_or(0.0)));
    }
    top.truncate(top_n);

    let top_total: f64 = top.iter().filter_map(|c| c.market_cap).sum();
    let market_share = top
        .iter()
        .filter_map(|c| {
            c.market_cap.map(|cap| ShareDatum {
                label: c.name.clone(),
                value: cap,
                share_pct: if top_total > 0.0 { cap / top_total * 100.0 } else { 0.0 },
            })
        })
        .collect();

    OverviewTab {
        top_n,
        top_by_market_cap: top
            .iter()
            .filter_map(|c| {
                c.market_cap.map(|cap| BarDatum {
                    label: c.name.clone(),
                    value: cap,
                })
            })
            .collect(),
        market_share,
        top_coins: top.iter().map(|c| TableRow::from(*c)).collect(),
    }
}

/// First `n` rows ordered by `key`, largest first for `Greater`, smallest first for `Less`.
/// Rows where the key is missing are skipped.
fn top_bars<F>(view: &[&CoinRecord], n: usize, key: F, direction: Ordering) -> Vec<BarDatum>
where
    F: Fn(&CoinRecord) -> Option<f64>,
{
    let mut keyed: Vec<(f64, &CoinRecord)> = view.iter().filter_map(|c| key(*c).map(|v| (v, *c))).collect();
    keyed.sort_by(|a, b| match direction {
        Ordering::Less => a.0.total_cmp(&b.0),
        _ => b.0.total_cmp(&a.0),
    });
    keyed
        .into_iter()
        .take(n)
        .map(|(value, c)| BarDatum {
            label: c.name.clone(),
            value,
        })
        .collect()
}

/// Equal-width bins over the observed range. A constant series lands in one bin.
pub fn histogram(values: impl Iterator<Item = f64>, bins: usize) -> Vec<HistogramBin> {
    let values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return vec![HistogramBin {
            start: min,
            end: max,
            count: values.len(),
        }];
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in &values {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            start: min + width * i as f64,
            end: if i == bins - 1 { max } else { min + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

pub fn year_counts(years: impl Iterator<Item = i32>) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for year in years {
        *counts.entry(year).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(year, count)| YearCount { year, count })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn coin(name: &str, rank: Option<u32>, cap: Option<f64>, price: Option<f64>) -> CoinRecord {
        CoinRecord {
            id: name.to_lowercase(),
            symbol: name[..3.min(name.len())].to_lowercase(),
            name: name.to_string(),
            image: None,
            current_price: price,
            market_cap: cap,
            market_cap_rank: rank,
            total_volume: cap.map(|c| c / 20.0),
            circulating_supply: Some(100.0),
            total_supply: Some(200.0),
            ath: None,
            ath_change_percentage: None,
            ath_date: None,
            atl: None,
            atl_change_percentage: None,
            atl_date: None,
            supply_ratio: Some(0.5),
        }
    }

    fn with_dates(mut c: CoinRecord, ath: i32, atl: i32, ath_pct: f64, atl_pct: f64) -> CoinRecord {
        c.ath_date = Some(Utc.with_ymd_and_hms(ath, 3, 1, 0, 0, 0).unwrap());
        c.atl_date = Some(Utc.with_ymd_and_hms(atl, 3, 1, 0, 0, 0).unwrap());
        c.ath_change_percentage = Some(ath_pct);
        c.atl_change_percentage = Some(atl_pct);
        c
    }

    fn table() -> Vec<CoinRecord> {
        vec![
            with_dates(coin("Bitcoin", Some(1), Some(1000.0), Some(60.0)), 2024, 2013, -5.0, 900.0),
            with_dates(coin("Ethereum", Some(2), Some(500.0), Some(30.0)), 2021, 2015, -30.0, 5000.0),
            with_dates(coin("Solana", Some(3), Some(300.0), Some(10.0)), 2021, 2020, -50.0, 700.0),
            coin("Unranked", None, None, None),
        ]
    }

    #[test]
    fn test_kpis() {
        let coins = table();
        let view: Vec<&CoinRecord> = coins.iter().collect();
        let kpis = compute_kpis(&view);

        assert_eq!(kpis.coin_count, 4);
        assert_eq!(kpis.total_market_cap, 1800.0);
        assert_eq!(kpis.avg_price, Some(100.0 / 3.0));
        assert_eq!(kpis.avg_market_cap, Some(600.0));
        assert_eq!(kpis.median_supply_ratio, Some(0.5));
        assert_eq!(kpis.aggregate_supply_ratio, Some(0.5));
        assert_eq!(kpis.farthest_above_atl.as_deref(), Some("Ethereum"));
        assert_eq!(kpis.top_ath_year, Some(2021));
        assert_eq!(kpis.top_atl_year, Some(2013), "ties go to the earliest year");
    }

    #[test]
    fn test_kpis_on_empty_view() {
        let kpis = compute_kpis(&[]);
        assert_eq!(kpis.coin_count, 0);
        assert_eq!(kpis.total_market_cap, 0.0);
        assert_eq!(kpis.avg_price, None);
        assert_eq!(kpis.median_supply_ratio, None);
        assert_eq!(kpis.aggregate_supply_ratio, None);
        assert_eq!(kpis.farthest_above_atl, None);

        let cards = kpi_cards(&kpis, DisplayMode::Full);
        assert_eq!(cards[0].value, "0");
        assert!(cards.iter().skip(2).all(|c| c.value == "NA"));
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[7.0]), Some(7.0));
    }

    #[test]
    fn test_display_mode_selection() {
        assert_eq!(DisplayMode::select(Some(400), None), DisplayMode::Compact);
        assert_eq!(DisplayMode::select(Some(1280), None), DisplayMode::Full);
        assert_eq!(DisplayMode::select(Some(1280), Some(true)), DisplayMode::Compact);
        assert_eq!(DisplayMode::select(Some(400), Some(false)), DisplayMode::Full);
        assert_eq!(DisplayMode::select(None, None), DisplayMode::Full);
    }

    #[test]
    fn test_compact_cards_are_a_subset() {
        let coins = table();
        let view: Vec<&CoinRecord> = coins.iter().collect();
        let kpis = compute_kpis(&view);

        let full = kpi_cards(&kpis, DisplayMode::Full);
        let compact = kpi_cards(&kpis, DisplayMode::Compact);
        assert_eq!(full.len(), 6);
        assert_eq!(compact.len(), 4);
        for c in &compact {
            assert!(full.contains(c));
        }
        assert_eq!(compact[2].value, "1,800");
    }

    #[test]
    fn test_format_grouped() {
        assert_eq!(format_grouped(1234567.891, 2), "1,234,567.89");
        assert_eq!(format_grouped(999.0, 0), "999");
        assert_eq!(format_grouped(1000.0, 0), "1,000");
        assert_eq!(format_grouped(-1234.5, 1), "-1,234.5");
        assert_eq!(format_grouped(0.0, 2), "0.00");
    }

    #[test]
    fn test_histogram() {
        let bins = histogram([0.0, 1.0, 2.0, 3.0, 4.0].into_iter(), 4);
        assert_eq!(bins.len(), 4);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 5);
        assert_eq!(bins[3].count, 2, "max value lands in the last bin");
        assert_eq!(bins[3].end, 4.0);

        assert!(histogram(std::iter::empty(), 10).is_empty());

        let constant = histogram([2.0, 2.0, 2.0].into_iter(), 10);
        assert_eq!(constant.len(), 1);
        assert_eq!(constant[0].count, 3);
    }

    #[test]
    fn test_tabs() {
        let coins = table();
        let view: Vec<&CoinRecord> = coins.iter().collect();
        let tabs = build_tabs(&view, &ChartOptions { top_n: 2, supply_top_n: 5 });

        let top: Vec<&str> = tabs.overview.top_by_market_cap.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(top, vec!["Bitcoin", "Ethereum"]);
        let share_total: f64 = tabs.overview.market_share.iter().map(|s| s.share_pct).sum();
        assert!((share_total - 100.0).abs() < 1e-9);

        assert_eq!(tabs.prices.top_by_price[0].label, "Bitcoin");
        assert_eq!(tabs.ath_atl.farthest_below_ath[0].label, "Solana");
        assert_eq!(tabs.ath_atl.farthest_above_atl[0].label, "Ethereum");
        assert_eq!(tabs.ath_atl.ath_years, vec![YearCount { year: 2021, count: 2 }, YearCount { year: 2024, count: 1 }]);
        assert_eq!(tabs.market_share.market_cap_vs_volume.len(), 3);
        assert_eq!(tabs.supply.top_by_circulating_supply.len(), 4);
        assert_eq!(tabs.table.len(), 4);
        assert_eq!(tabs.table[0].ath_year, Some(2024));
    }

    #[test]
    fn test_overview_falls_back_to_market_cap_without_ranks() {
        let coins = vec![
            coin("Small", None, Some(1.0), None),
            coin("Large", None, Some(9.0), None),
        ];
        let view: Vec<&CoinRecord> = coins.iter().collect();
        let tabs = build_tabs(&view, &ChartOptions::default());
        assert_eq!(tabs.overview.top_by_market_cap[0].label, "Large");
    }

    #[test]
    fn test_tabs_on_empty_view() {
        let tabs = build_tabs(&[], &ChartOptions::default());
        assert!(tabs.overview.top_by_market_cap.is_empty());
        assert!(tabs.market_share.market_cap_histogram.is_empty());
        assert!(tabs.ath_atl.ath_years.is_empty());
        assert!(tabs.table.is_empty());
    }
}
