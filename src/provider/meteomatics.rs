//! Meteomatics forecast source.
//!
//! Fetches a six-day daily forecast per location as a semicolon-delimited
//! CSV table and parses it into structured rows.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::{LocationSpec, ProviderConfig, ProviderCredentials};
use crate::provider::{ForecastRow, ForecastSource};

/// Daily step over the requested window.
const TIME_STEP: &str = "P1D";
/// Temperature (°C), precipitation over the prior hour (mm), wind speed (m/s).
const METRICS: &str = "t_2m:C,precip_1h:mm,wind_speed_10m:ms";
/// Days ahead requested on every fetch.
const WINDOW_DAYS: i64 = 6;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A malformed row in the provider's CSV payload. Aborts the affected
/// location's ingestion; other locations are unaffected.
#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("row {line} has {count} fields, expected 4")]
    FieldCount { line: usize, count: usize },
    #[error("row {line}: invalid timestamp {value:?}")]
    Timestamp { line: usize, value: String },
    #[error("row {line}: invalid number {value:?}")]
    Number { line: usize, value: String },
}

pub struct MeteomaticsClient {
    client: reqwest::Client,
    base_url: String,
    credentials: ProviderCredentials,
}

impl MeteomaticsClient {
    pub fn new(config: &ProviderConfig, credentials: ProviderCredentials) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("weather-pipeline/0.1")
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn request_url(&self, location: &LocationSpec, now: DateTime<Utc>) -> String {
        let (start, end) = forecast_window(now);
        format!(
            "{}/{}--{}:{}/{}/{}/csv",
            self.base_url,
            start.format(TIMESTAMP_FORMAT),
            end.format(TIMESTAMP_FORMAT),
            TIME_STEP,
            METRICS,
            location.coordinates(),
        )
    }
}

#[async_trait]
impl ForecastSource for MeteomaticsClient {
    async fn fetch(&self, location: &LocationSpec) -> Result<Vec<ForecastRow>> {
        let url = self.request_url(location, Utc::now());

        let response = self
            .client
            .get(&url)
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
            .send()
            .await
            .with_context(|| format!("Forecast request failed for {}", location.name))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read forecast response body")?;

        if !status.is_success() {
            bail!("Provider returned {status} for {}: {body}", location.name);
        }

        let rows = parse_forecast_csv(&body)
            .with_context(|| format!("Malformed forecast payload for {}", location.name))?;
        Ok(rows)
    }

    fn name(&self) -> &str {
        "meteomatics"
    }
}

/// Forecast window for a fetch triggered at `now`: start is `now` truncated
/// to whole seconds, end is start + 6 days. Recomputed per call, so the
/// window shifts forward on every run.
pub fn forecast_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now.trunc_subsecs(0);
    let end = start + chrono::Duration::days(WINDOW_DAYS);
    (start, end)
}

/// Parse the provider's CSV payload. The first line is a header and is
/// discarded; every remaining line must hold exactly four semicolon-separated
/// fields: date, temperature, precipitation, wind speed.
pub fn parse_forecast_csv(body: &str) -> Result<Vec<ForecastRow>, ParseError> {
    let mut rows = Vec::new();

    for (line, text) in body.trim().lines().enumerate().skip(1) {
        let fields: Vec<&str> = text.split(';').collect();
        if fields.len() != 4 {
            return Err(ParseError::FieldCount {
                line,
                count: fields.len(),
            });
        }

        let valid_time = DateTime::parse_from_rfc3339(fields[0])
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| ParseError::Timestamp {
                line,
                value: fields[0].to_string(),
            })?;

        let mut numbers = [0.0f64; 3];
        for (slot, field) in numbers.iter_mut().zip(&fields[1..]) {
            *slot = field.trim().parse().map_err(|_| ParseError::Number {
                line,
                value: field.to_string(),
            })?;
        }

        rows.push(ForecastRow {
            valid_time,
            temperature: numbers[0],
            precipitation: numbers[1],
            wind_speed: numbers[2],
        });
    }

    Ok(rows)
}
