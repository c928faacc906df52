use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::services::dataset::{ALLOWED_SIZES, SUPPORTED_CURRENCIES};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Runtime settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub coingecko_base_url: String,
    pub coingecko_api_key: Option<String>,
    pub request_timeout: Duration,
    pub page_delay: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    /// Longest Retry-After the fetcher will sleep through; longer asks fail the page.
    pub max_retry_wait: Duration,
    pub cache_ttl: Duration,
    pub default_vs_currency: String,
    pub default_target_size: usize,
    pub prefetch_on_start: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            coingecko_base_url: DEFAULT_BASE_URL.to_string(),
            coingecko_api_key: None,
            request_timeout: Duration::from_secs(30),
            page_delay: Duration::from_millis(100),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1000),
            max_retry_wait: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(600),
            default_vs_currency: "usd".to_string(),
            default_target_size: 1000,
            prefetch_on_start: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_vs_currency = get("DEFAULT_VS_CURRENCY")
            .map(|v| v.trim().to_lowercase())
            .unwrap_or(defaults.default_vs_currency);
        if !SUPPORTED_CURRENCIES.contains(&default_vs_currency.as_str()) {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_VS_CURRENCY",
                value: default_vs_currency,
                reason: format!("expected one of {:?}", SUPPORTED_CURRENCIES),
            });
        }

        let default_target_size =
            parse_or("DEFAULT_TARGET_SIZE", get("DEFAULT_TARGET_SIZE"), defaults.default_target_size)?;
        if !ALLOWED_SIZES.contains(&default_target_size) {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_TARGET_SIZE",
                value: default_target_size.to_string(),
                reason: format!("expected one of {:?}", ALLOWED_SIZES),
            });
        }

        let request_timeout_secs = parse_or(
            "REQUEST_TIMEOUT_SECS",
            get("REQUEST_TIMEOUT_SECS"),
            defaults.request_timeout.as_secs(),
        )?;
        if request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "REQUEST_TIMEOUT_SECS",
                value: request_timeout_secs.to_string(),
                reason: "must be at least 1 second".to_string(),
            });
        }

        let prefetch_on_start = match get("PREFETCH_ON_START") {
            Some(raw) => parse_bool("PREFETCH_ON_START", &raw)?,
            None => defaults.prefetch_on_start,
        };

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            coingecko_base_url: get("COINGECKO_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.coingecko_base_url),
            coingecko_api_key: get("COINGECKO_API_KEY"),
            request_timeout: Duration::from_secs(request_timeout_secs),
            page_delay: Duration::from_millis(parse_or(
                "PAGE_DELAY_MS",
                get("PAGE_DELAY_MS"),
                defaults.page_delay.as_millis() as u64,
            )?),
            max_retries: parse_or("FETCH_MAX_RETRIES", get("FETCH_MAX_RETRIES"), defaults.max_retries)?,
            retry_base_delay: Duration::from_millis(parse_or(
                "RETRY_BASE_DELAY_MS",
                get("RETRY_BASE_DELAY_MS"),
                defaults.retry_base_delay.as_millis() as u64,
            )?),
            max_retry_wait: Duration::from_secs(parse_or(
                "MAX_RETRY_WAIT_SECS",
                get("MAX_RETRY_WAIT_SECS"),
                defaults.max_retry_wait.as_secs(),
            )?),
            cache_ttl: Duration::from_secs(parse_or(
                "CACHE_TTL_SECS",
                get("CACHE_TTL_SECS"),
                defaults.cache_ttl.as_secs(),
            )?),
            default_vs_currency,
            default_target_size,
            prefetch_on_start,
        })
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: value.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.coingecko_base_url, DEFAULT_BASE_URL);
        assert_eq!(config.default_target_size, 1000);
        assert_eq!(config.default_vs_currency, "usd");
        assert_eq!(config.cache_ttl, Duration::from_secs(600));
        assert_eq!(config.max_retry_wait, Duration::from_secs(30));
        assert!(config.coingecko_api_key.is_none());
        assert!(config.prefetch_on_start);
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("COINGECKO_BASE_URL", "http://127.0.0.1:9000/api/v3/"),
            ("COINGECKO_API_KEY", "secret"),
            ("FETCH_MAX_RETRIES", "0"),
            ("PAGE_DELAY_MS", "0"),
            ("DEFAULT_VS_CURRENCY", "EUR"),
            ("DEFAULT_TARGET_SIZE", "500"),
            ("PREFETCH_ON_START", "off"),
            ("MAX_RETRY_WAIT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.coingecko_base_url, "http://127.0.0.1:9000/api/v3");
        assert_eq!(config.coingecko_api_key.as_deref(), Some("secret"));
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.page_delay, Duration::ZERO);
        assert_eq!(config.default_vs_currency, "eur");
        assert_eq!(config.default_target_size, 500);
        assert!(!config.prefetch_on_start);
        assert_eq!(config.max_retry_wait, Duration::from_secs(5));
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        let err = AppConfig::from_lookup(lookup_from(&[("REQUEST_TIMEOUT_SECS", "0")])).unwrap_err();
        assert!(err.to_string().contains("REQUEST_TIMEOUT_SECS"));

        let config = AppConfig::from_lookup(lookup_from(&[("REQUEST_TIMEOUT_SECS", "1")])).unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = AppConfig::from_lookup(lookup_from(&[("COINGECKO_API_KEY", "  ")])).unwrap();
        assert!(config.coingecko_api_key.is_none());
    }

    #[test]
    fn test_rejects_unsupported_size() {
        let err = AppConfig::from_lookup(lookup_from(&[("DEFAULT_TARGET_SIZE", "750")])).unwrap_err();
        assert!(err.to_string().contains("DEFAULT_TARGET_SIZE"));
    }

    #[test]
    fn test_rejects_garbage_numbers() {
        assert!(AppConfig::from_lookup(lookup_from(&[("CACHE_TTL_SECS", "ten")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("PREFETCH_ON_START", "maybe")])).is_err());
        assert!(AppConfig::from_lookup(lookup_from(&[("DEFAULT_VS_CURRENCY", "btc")])).is_err());
    }
}
