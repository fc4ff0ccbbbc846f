pub mod meteomatics;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::LocationSpec;

pub use meteomatics::MeteomaticsClient;

/// One parsed forecast row: a daily observation inside the forecast window.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRow {
    pub valid_time: DateTime<Utc>,
    /// Air temperature, °C.
    pub temperature: f64,
    /// Precipitation over the prior hour, mm.
    pub precipitation: f64,
    /// Wind speed, m/s.
    pub wind_speed: f64,
}

/// Trait for forecast providers.
/// Each implementation fetches the full forecast window for one location.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetch the forecast rows for a location, one row per day.
    async fn fetch(&self, location: &LocationSpec) -> Result<Vec<ForecastRow>>;

    /// Human-readable name of this provider.
    fn name(&self) -> &str;
}
