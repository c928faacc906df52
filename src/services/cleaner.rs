use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;

use crate::models::coin::{CoinRecord, RawMarketCoin};

/// Normalize raw market rows into the dashboard table.
///
/// Never fails: fields that cannot be coerced become `None` and the row is kept.
/// Rows without an identifier are dropped, duplicates keep their first
/// occurrence, and the result is ordered by market cap rank with unranked rows last.
pub fn clean_coins(raw: &[RawMarketCoin]) -> Vec<CoinRecord> {
    let mut seen_ids = HashSet::new();
    let mut seen_pairs = HashSet::new();
    let mut dropped = 0usize;

    let mut coins: Vec<CoinRecord> = raw
        .iter()
        .filter_map(|row| {
            let coin = clean_coin(row);
            if coin.is_none() {
                dropped += 1;
            }
            coin
        })
        .filter(|coin| seen_ids.insert(coin.id.clone()))
        .filter(|coin| seen_pairs.insert((coin.symbol.clone(), coin.name.clone())))
        .collect();

    if dropped > 0 {
        tracing::debug!("Dropped {} rows without an identifier", dropped);
    }

    coins.sort_by_key(|c| c.market_cap_rank.unwrap_or(u32::MAX));
    coins
}

/// Clean a single row. `None` only when the row has no usable identifier.
pub fn clean_coin(raw: &RawMarketCoin) -> Option<CoinRecord> {
    let id = coerce_text(&raw.id)?;

    let circulating_supply = coerce_non_negative(&raw.circulating_supply);
    let total_supply = coerce_non_negative(&raw.total_supply);

    Some(CoinRecord {
        id,
        symbol: coerce_text(&raw.symbol).unwrap_or_default(),
        name: coerce_text(&raw.name).unwrap_or_default(),
        image: coerce_text(&raw.image),
        current_price: coerce_non_negative(&raw.current_price),
        market_cap: coerce_non_negative(&raw.market_cap),
        market_cap_rank: coerce_rank(&raw.market_cap_rank),
        total_volume: coerce_non_negative(&raw.total_volume),
        circulating_supply,
        total_supply,
        ath: coerce_non_negative(&raw.ath),
        ath_change_percentage: coerce_number(&raw.ath_change_percentage).map(round2),
        ath_date: parse_date(&raw.ath_date),
        atl: coerce_non_negative(&raw.atl),
        atl_change_percentage: coerce_number(&raw.atl_change_percentage).map(round2),
        atl_date: parse_date(&raw.atl_date),
        supply_ratio: supply_ratio(circulating_supply, total_supply),
    })
}

/// circulating / total, only when both exist and total is positive.
pub fn supply_ratio(circulating: Option<f64>, total: Option<f64>) -> Option<f64> {
    match (circulating, total) {
        (Some(c), Some(t)) if t > 0.0 => Some(c / t),
        _ => None,
    }
}

pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn coerce_non_negative(value: &Value) -> Option<f64> {
    coerce_number(value).filter(|v| *v >= 0.0)
}

fn coerce_rank(value: &Value) -> Option<u32> {
    coerce_number(value)
        .filter(|v| *v >= 1.0 && v.fract() == 0.0 && *v <= u32::MAX as f64)
        .map(|v| v as u32)
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM:SS[.f]` and plain `YYYY-MM-DD`.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
