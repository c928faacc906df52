// src/lib.rs

use std::sync::Arc;

use config::AppConfig;
use services::dataset::DatasetService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub datasets: DatasetService,
}

pub mod services {
    pub mod analytics;
    pub mod cleaner;
    pub mod coingecko;
    pub mod dataset;
    pub mod filter;
}

pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
