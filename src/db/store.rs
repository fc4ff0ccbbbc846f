use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

use crate::provider::ForecastRow;

pub struct Store {
    pool: SqlitePool,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LocationRecord {
    pub id: i64,
    pub name: String,
    /// Canonical `"lat,lon"` string, unique across locations.
    pub coordinates: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ForecastRecord {
    pub id: Option<i64>,
    pub location_id: i64,
    /// RFC 3339 UTC timestamp as delivered by the provider.
    pub forecast_date: String,
    pub temperature: f64,
    pub precipitation: f64,
    pub wind_speed: f64,
}

impl ForecastRecord {
    /// Calendar-date portion (`YYYY-MM-DD`) of the forecast timestamp.
    pub fn calendar_date(&self) -> &str {
        let end = self.forecast_date.len().min(10);
        &self.forecast_date[..end]
    }
}

impl Store {
    /// Create a Store from an existing pool (for sharing between the
    /// pipeline and the dashboard).
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn new(database_path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{database_path}"))
            .context("Invalid database path")?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        let migration_sql = include_str!("../../migrations/001_init.sql");
        // Execute each statement separately (sqlx doesn't support multiple statements in one call)
        for statement in migration_sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("Failed to execute migration: {trimmed}"))?;
            }
        }
        Ok(())
    }

    // --- Location operations ---

    /// Insert a location unless its name or coordinate pair is already
    /// registered. Repeated calls are no-ops.
    pub async fn ensure_location(&self, name: &str, coordinates: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO locations (name, coordinates) VALUES (?, ?)")
            .bind(name)
            .bind(coordinates)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to register location {name}"))?;
        Ok(())
    }

    pub async fn all_locations(&self) -> Result<Vec<LocationRecord>> {
        let locations =
            sqlx::query_as::<_, LocationRecord>("SELECT * FROM locations ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch locations")?;
        Ok(locations)
    }

    pub async fn location_by_name(&self, name: &str) -> Result<Option<LocationRecord>> {
        let location =
            sqlx::query_as::<_, LocationRecord>("SELECT * FROM locations WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to look up location {name}"))?;
        Ok(location)
    }

    /// Number of distinct registered locations.
    pub async fn count_locations(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(DISTINCT name) FROM locations")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count locations")?;
        Ok(row.0)
    }

    // --- Forecast operations ---

    /// Insert the fetched rows for a location, skipping any (location, date)
    /// pair that is already stored. First-seen values win; a row is never
    /// overwritten by a later fetch. Returns the number of rows inserted.
    ///
    /// The existence check and insert are separate statements, so concurrent
    /// ingestion runs could race; a single active ingestion process is
    /// assumed.
    pub async fn insert_missing_forecasts(
        &self,
        location_name: &str,
        rows: &[ForecastRow],
    ) -> Result<u64> {
        let location = self
            .location_by_name(location_name)
            .await?
            .with_context(|| format!("Location {location_name} is not registered"))?;

        let mut inserted = 0;
        for row in rows {
            let forecast_date = row.valid_time.format("%Y-%m-%dT%H:%M:%SZ").to_string();
            let exists: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM forecasts WHERE location_id = ? AND forecast_date = ?",
            )
            .bind(location.id)
            .bind(&forecast_date)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check for existing forecast")?;

            if exists.is_some() {
                continue;
            }

            sqlx::query(
                "INSERT INTO forecasts (location_id, forecast_date, temperature, precipitation, wind_speed)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(location.id)
            .bind(&forecast_date)
            .bind(row.temperature)
            .bind(row.precipitation)
            .bind(row.wind_speed)
            .execute(&self.pool)
            .await
            .context("Failed to insert forecast")?;
            inserted += 1;
        }

        Ok(inserted)
    }

    /// All stored forecasts for a location, date ascending. Rows sharing a
    /// date come back in insertion order (id tiebreak), which the rolling
    /// average depends on.
    pub async fn forecasts_for(&self, location_id: i64) -> Result<Vec<ForecastRecord>> {
        let forecasts = sqlx::query_as::<_, ForecastRecord>(
            "SELECT * FROM forecasts WHERE location_id = ? ORDER BY forecast_date, id",
        )
        .bind(location_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch forecasts")?;
        Ok(forecasts)
    }

    /// One forecast per distinct calendar date for a location: the most
    /// recently inserted row for that date.
    pub async fn latest_per_date(&self, location_id: i64) -> Result<Vec<ForecastRecord>> {
        let forecasts = sqlx::query_as::<_, ForecastRecord>(
            "SELECT f.* FROM forecasts f
             JOIN (SELECT MAX(id) AS max_id FROM forecasts WHERE location_id = ?
                   GROUP BY date(forecast_date)) latest
               ON f.id = latest.max_id
             ORDER BY f.forecast_date",
        )
        .bind(location_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch latest forecasts")?;
        Ok(forecasts)
    }

    /// Total stored forecast rows for a location.
    pub async fn count_forecasts(&self, location_id: i64) -> Result<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM forecasts WHERE location_id = ?")
                .bind(location_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to count forecasts")?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(day: u32, hour: u32, temperature: f64) -> ForecastRow {
        ForecastRow {
            valid_time: Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap(),
            temperature,
            precipitation: 0.0,
            wind_speed: 3.0,
        }
    }

    #[tokio::test]
    async fn test_store_create_and_migrate() {
        let store = Store::new(":memory:").await.expect("should create store");
        store
            .ensure_location("Athens", "37.9838,23.7275")
            .await
            .expect("should insert location");
        let locations = store.all_locations().await.expect("should list");
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].name, "Athens");
    }

    #[tokio::test]
    async fn test_ensure_location_is_idempotent() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.ensure_location("Athens", "37.9838,23.7275").await.unwrap();
        store.ensure_location("Athens", "37.9838,23.7275").await.unwrap();
        // Same coordinates under a different name are skipped too.
        store.ensure_location("Athina", "37.9838,23.7275").await.unwrap();
        assert_eq!(store.count_locations().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_insert_missing_is_idempotent() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.ensure_location("Athens", "37.9838,23.7275").await.unwrap();

        let rows = vec![row(5, 12, 31.0), row(6, 12, 30.0)];
        let first = store.insert_missing_forecasts("Athens", &rows).await.unwrap();
        assert_eq!(first, 2);

        // Re-ingesting the identical rows leaves the stored count unchanged.
        let second = store.insert_missing_forecasts("Athens", &rows).await.unwrap();
        assert_eq!(second, 0);

        let location = store.location_by_name("Athens").await.unwrap().unwrap();
        assert_eq!(store.count_forecasts(location.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_existing_date_keeps_first_seen_value() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.ensure_location("Athens", "37.9838,23.7275").await.unwrap();

        store
            .insert_missing_forecasts("Athens", &[row(5, 12, 31.0)])
            .await
            .unwrap();
        // A later fetch with a different value for the same instant is skipped.
        store
            .insert_missing_forecasts("Athens", &[row(5, 12, 28.5)])
            .await
            .unwrap();

        let location = store.location_by_name("Athens").await.unwrap().unwrap();
        let stored = store.forecasts_for(location.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].temperature, 31.0);
    }

    #[tokio::test]
    async fn test_unregistered_location_is_an_error() {
        let store = Store::new(":memory:").await.expect("should create store");
        let err = store
            .insert_missing_forecasts("Atlantis", &[row(5, 12, 20.0)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not registered"));
    }

    #[tokio::test]
    async fn test_forecasts_ordered_by_date() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.ensure_location("Athens", "37.9838,23.7275").await.unwrap();

        store
            .insert_missing_forecasts("Athens", &[row(7, 12, 29.0), row(5, 12, 31.0), row(6, 12, 30.0)])
            .await
            .unwrap();

        let location = store.location_by_name("Athens").await.unwrap().unwrap();
        let stored = store.forecasts_for(location.id).await.unwrap();
        let dates: Vec<&str> = stored.iter().map(|f| f.calendar_date()).collect();
        assert_eq!(dates, vec!["2026-08-05", "2026-08-06", "2026-08-07"]);
    }

    #[tokio::test]
    async fn test_latest_per_date_picks_most_recent_insert() {
        let store = Store::new(":memory:").await.expect("should create store");
        store.ensure_location("Athens", "37.9838,23.7275").await.unwrap();

        // Three observations on the same calendar date, inserted in order.
        store.insert_missing_forecasts("Athens", &[row(5, 0, 24.0)]).await.unwrap();
        store.insert_missing_forecasts("Athens", &[row(5, 6, 26.0)]).await.unwrap();
        store.insert_missing_forecasts("Athens", &[row(5, 12, 31.0)]).await.unwrap();
        store.insert_missing_forecasts("Athens", &[row(6, 12, 30.0)]).await.unwrap();

        let location = store.location_by_name("Athens").await.unwrap().unwrap();
        let latest = store.latest_per_date(location.id).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].calendar_date(), "2026-08-05");
        assert_eq!(latest[0].temperature, 31.0);
        assert_eq!(latest[1].temperature, 30.0);
    }
}
