use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{dashboard, ui};
use crate::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ui::index))
        .route("/health", get(ui::health))
        .route("/api/dashboard", get(dashboard::get_dashboard))
        .route("/api/coins", get(dashboard::get_coins))
        .route("/api/kpis", get(dashboard::get_kpis))
        .route("/api/filters/bounds", get(dashboard::get_filter_bounds))
        .route("/api/refresh", post(dashboard::refresh_data))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
