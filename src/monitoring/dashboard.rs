//! Web dashboard — axum HTTP server serving the read-only JSON API.
//!
//! Strictly a consumer of the store's query interface and the stats module;
//! no route mutates anything.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::db::store::{ForecastRecord, Store};
use crate::stats::{self, Metric};

/// Shared state accessible by all dashboard route handlers.
#[derive(Clone)]
pub struct DashboardState {
    store: Arc<Store>,
}

impl DashboardState {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/locations", get(locations_handler))
        .route("/api/forecasts", get(forecasts_handler))
        .route("/api/forecasts/latest", get(latest_forecasts_handler))
        .route("/api/averages", get(averages_handler))
        .route("/api/top/{metric}", get(top_locations_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the dashboard until the process is stopped.
pub async fn serve(state: DashboardState, bind: &str, port: u16) -> Result<()> {
    let addr = format!("{bind}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Dashboard server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// -- Route Handlers --

async fn index_handler() -> impl IntoResponse {
    let html = include_str!("../../static/index.html");
    ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], html)
}

async fn locations_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match state.store.all_locations().await {
        Ok(locations) => Json(serde_json::to_value(&locations).unwrap_or_default()),
        Err(e) => Json(serde_json::json!({"error": e.to_string()})),
    }
}

async fn forecasts_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match forecasts_by_location(&state.store).await {
        Ok(grouped) => Json(serde_json::to_value(&grouped).unwrap_or_default()),
        Err(e) => Json(serde_json::json!({"error": e.to_string()})),
    }
}

async fn latest_forecasts_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match latest_by_location(&state.store).await {
        Ok(grouped) => Json(serde_json::to_value(&grouped).unwrap_or_default()),
        Err(e) => Json(serde_json::json!({"error": e.to_string()})),
    }
}

async fn averages_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    match averages_by_location(&state.store).await {
        Ok(grouped) => Json(serde_json::to_value(&grouped).unwrap_or_default()),
        Err(e) => Json(serde_json::json!({"error": e.to_string()})),
    }
}

async fn top_locations_handler(
    State(state): State<DashboardState>,
    Path(metric): Path<String>,
) -> impl IntoResponse {
    // Client input is validated before any storage access.
    let metric: Metric = match metric.parse() {
        Ok(m) => m,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    match stats::top_locations(&state.store, metric, None).await {
        Ok(rankings) => Json(serde_json::to_value(&rankings).unwrap_or_default()).into_response(),
        Err(e) => Json(serde_json::json!({"error": e.to_string()})).into_response(),
    }
}

// -- Query composition --

async fn forecasts_by_location(
    store: &Store,
) -> Result<BTreeMap<String, Vec<ForecastRecord>>> {
    let mut grouped = BTreeMap::new();
    for location in store.all_locations().await? {
        let forecasts = store.forecasts_for(location.id).await?;
        grouped.insert(location.name, forecasts);
    }
    Ok(grouped)
}

async fn latest_by_location(store: &Store) -> Result<BTreeMap<String, Vec<ForecastRecord>>> {
    let mut grouped = BTreeMap::new();
    for location in store.all_locations().await? {
        let forecasts = store.latest_per_date(location.id).await?;
        grouped.insert(location.name, forecasts);
    }
    Ok(grouped)
}

async fn averages_by_location(
    store: &Store,
) -> Result<BTreeMap<String, BTreeMap<String, f64>>> {
    let mut grouped = BTreeMap::new();
    for location in store.all_locations().await? {
        let averages = stats::rolling_average_for(store, location.id).await?;
        grouped.insert(location.name, averages);
    }
    Ok(grouped)
}
