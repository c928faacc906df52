use axum::{response::Html, Json};

use crate::models::dashboard::HealthResponse;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Handler for GET /
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}
