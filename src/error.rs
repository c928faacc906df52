use axum::http::StatusCode;
use thiserror::Error;

/// Failure while pulling market pages from the upstream API.
///
/// Every variant names the page that failed so a partial pagination failure
/// can be traced in the logs.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error on page {page}: {source}")]
    Network {
        page: usize,
        #[source]
        source: reqwest::Error,
    },

    #[error("rate limited by market data API on page {page}")]
    RateLimited {
        page: usize,
        retry_after_secs: Option<u64>,
    },

    #[error("market data API error {status} on page {page}: {body}")]
    Status {
        page: usize,
        status: u16,
        body: String,
    },

    #[error("could not decode page {page}: {source}")]
    Decode {
        page: usize,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub fn page(&self) -> usize {
        match self {
            FetchError::Network { page, .. }
            | FetchError::RateLimited { page, .. }
            | FetchError::Status { page, .. }
            | FetchError::Decode { page, .. } => *page,
        }
    }

    /// Whether another attempt at the same page may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::RateLimited { .. } => true,
            FetchError::Status { status, .. } => *status >= 500,
            FetchError::Decode { .. } => false,
        }
    }

    /// HTTP status used when this error is returned to a dashboard client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            FetchError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Message shown in the dashboard error banner.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::RateLimited { .. } => {
                "CoinGecko API rate limit reached. Please try again later.".to_string()
            }
            other => format!("Failed to fetch data from CoinGecko: {}", other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
