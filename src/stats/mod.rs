//! Derived statistics over stored forecasts.
//!
//! Reads through the store's query interface only; owns no data.

use std::collections::BTreeMap;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::FromRow;
use thiserror::Error;

use crate::db::store::{ForecastRecord, Store};

/// How many same-date observations feed the rolling average. The last N in
/// insertion order are the most recently ingested, so this acts as a
/// recency-weighted smoothing of the daily temperature.
const ROLLING_WINDOW: usize = 3;

/// The closed set of rankable metrics. Client input is parsed into this enum
/// before any storage access; the column name is never interpolated from
/// user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Temperature,
    Precipitation,
    WindSpeed,
}

/// Unsupported metric name in a ranking request. A client-input error,
/// distinct from storage faults.
#[derive(Debug, Error, PartialEq)]
#[error("unsupported metric {0:?}; expected temperature, precipitation or wind_speed")]
pub struct MetricError(pub String);

impl FromStr for Metric {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Self::Temperature),
            "precipitation" => Ok(Self::Precipitation),
            "wind_speed" => Ok(Self::WindSpeed),
            other => Err(MetricError(other.to_string())),
        }
    }
}

impl Metric {
    fn column(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Precipitation => "precipitation",
            Self::WindSpeed => "wind_speed",
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// A location's mean value for some metric across all stored forecasts.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LocationAverage {
    pub name: String,
    pub average: f64,
}

/// Per-date rolling average of the most recent `ROLLING_WINDOW` temperature
/// observations, keyed by calendar date. Records must arrive in the store's
/// retrieval order (date, then insertion); a date with no records has no key.
pub fn rolling_average(records: &[ForecastRecord]) -> BTreeMap<String, f64> {
    let mut by_date: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for record in records {
        by_date
            .entry(record.calendar_date().to_string())
            .or_default()
            .push(record.temperature);
    }

    by_date
        .into_iter()
        .map(|(date, temps)| {
            let recent = &temps[temps.len().saturating_sub(ROLLING_WINDOW)..];
            let average = recent.iter().sum::<f64>() / recent.len() as f64;
            (date, average)
        })
        .collect()
}

/// Rolling temperature averages for one location, read through the store.
pub async fn rolling_average_for(
    store: &Store,
    location_id: i64,
) -> Result<BTreeMap<String, f64>> {
    let records = store.forecasts_for(location_id).await?;
    Ok(rolling_average(&records))
}

/// Rank locations by the mean of a metric across all stored forecasts,
/// descending. `limit` defaults to the number of registered locations.
/// Locations with no stored forecasts are not ranked. Tie order between
/// equal averages is unspecified.
pub async fn top_locations(
    store: &Store,
    metric: Metric,
    limit: Option<i64>,
) -> Result<Vec<LocationAverage>> {
    let limit = match limit {
        Some(n) => n,
        None => store.count_locations().await?,
    };

    let query = format!(
        "SELECT l.name AS name, AVG(f.{}) AS average
         FROM forecasts f JOIN locations l ON f.location_id = l.id
         GROUP BY l.name ORDER BY average DESC LIMIT ?",
        metric.column()
    );

    let rankings = sqlx::query_as::<_, LocationAverage>(&query)
        .bind(limit)
        .fetch_all(store.pool())
        .await
        .context("Failed to rank locations")?;
    Ok(rankings)
}
