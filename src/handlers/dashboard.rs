use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    models::{
        coin::CoinRecord,
        dashboard::{
            BoundsResponse, CoinsResponse, DashboardQuery, DashboardResponse, DatasetMeta, ErrorResponse,
            KpiResponse, RefreshResponse,
        },
    },
    services::{
        analytics::{build_tabs, compute_kpis, kpi_cards, TableRow},
        dataset::{DatasetKey, LoadOutcome},
        filter::{apply_filters, filter_bounds},
    },
    AppState,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Handler for GET /api/dashboard
/// Runs the full pipeline and returns KPIs, bounds and every tab.
/// Fetch failures become the `error` banner rather than an HTTP error.
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardResponse>, ApiError> {
    query.validate().map_err(bad_request)?;

    let key = query.dataset_key(&state.config);
    let outcome = state.datasets.load(&key).await;
    let coins = table_of(&outcome);

    let view = apply_filters(coins, &query.filter_params());
    let kpis = compute_kpis(&view);
    let display_mode = query.display_mode();

    tracing::debug!(
        "Dashboard for {}_{}: {} of {} rows after filters",
        key.vs_currency,
        key.target_size,
        view.len(),
        coins.len()
    );

    Ok(Json(DashboardResponse {
        meta: dataset_meta(&key, &outcome, view.len()),
        error: outcome.error.as_ref().map(|e| e.user_message()),
        display_mode,
        kpi_cards: kpi_cards(&kpis, display_mode),
        kpis,
        bounds: filter_bounds(coins),
        tabs: build_tabs(&view, &query.chart_options()),
    }))
}

/// Handler for GET /api/coins
/// Filtered table rows only
pub async fn get_coins(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<CoinsResponse>, ApiError> {
    query.validate().map_err(bad_request)?;

    let key = query.dataset_key(&state.config);
    let outcome = state.datasets.load(&key).await;
    require_table(&outcome)?;

    let view = apply_filters(table_of(&outcome), &query.filter_params());

    Ok(Json(CoinsResponse {
        meta: dataset_meta(&key, &outcome, view.len()),
        error: outcome.error.as_ref().map(|e| e.user_message()),
        coins: view.iter().map(|c| TableRow::from(*c)).collect(),
    }))
}

/// Handler for GET /api/kpis
pub async fn get_kpis(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<KpiResponse>, ApiError> {
    query.validate().map_err(bad_request)?;

    let key = query.dataset_key(&state.config);
    let outcome = state.datasets.load(&key).await;
    require_table(&outcome)?;

    let view = apply_filters(table_of(&outcome), &query.filter_params());
    let kpis = compute_kpis(&view);
    let display_mode = query.display_mode();

    Ok(Json(KpiResponse {
        meta: dataset_meta(&key, &outcome, view.len()),
        error: outcome.error.as_ref().map(|e| e.user_message()),
        display_mode,
        kpi_cards: kpi_cards(&kpis, display_mode),
        kpis,
    }))
}

/// Handler for GET /api/filters/bounds
/// Slider limits of the unfiltered table
pub async fn get_filter_bounds(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<BoundsResponse>, ApiError> {
    query.validate().map_err(bad_request)?;

    let key = query.dataset_key(&state.config);
    let outcome = state.datasets.load(&key).await;
    require_table(&outcome)?;

    let coins = table_of(&outcome);

    Ok(Json(BoundsResponse {
        meta: dataset_meta(&key, &outcome, coins.len()),
        error: outcome.error.as_ref().map(|e| e.user_message()),
        bounds: filter_bounds(coins),
    }))
}

/// Handler for POST /api/refresh
pub async fn refresh_data(State(state): State<AppState>) -> Json<RefreshResponse> {
    state.datasets.refresh().await;
    Json(RefreshResponse { cleared: true })
}

fn table_of(outcome: &LoadOutcome) -> &[CoinRecord] {
    outcome
        .dataset
        .as_deref()
        .map(|d| d.coins.as_slice())
        .unwrap_or(&[])
}

/// Endpoints other than the dashboard cannot render an empty fallback.
fn require_table(outcome: &LoadOutcome) -> Result<(), ApiError> {
    match (&outcome.dataset, &outcome.error) {
        (None, Some(e)) => Err((
            e.status_code(),
            Json(ErrorResponse {
                error: e.user_message(),
            }),
        )),
        _ => Ok(()),
    }
}

fn dataset_meta(key: &DatasetKey, outcome: &LoadOutcome, filtered: usize) -> DatasetMeta {
    let dataset = outcome.dataset.as_deref();
    let served = dataset.map_or(key, |d| &d.key);
    DatasetMeta {
        vs_currency: served.vs_currency.clone(),
        requested: served.target_size,
        query_vs_currency: key.vs_currency.clone(),
        query_size: key.target_size,
        fetched: dataset.map_or(0, |d| d.raw_count),
        unique: dataset.map_or(0, |d| d.coins.len()),
        filtered,
        fetched_at: dataset.map(|d| d.fetched_at),
        cached: outcome.cached,
        stale: outcome.is_stale(),
    }
}

fn bad_request(error: String) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}
