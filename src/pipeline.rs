//! Ingestion pipeline: fetch each registered location's forecast window and
//! commit whatever is new.

use anyhow::Result;
use tracing::{info, warn};

use crate::config::LocationSpec;
use crate::db::store::Store;
use crate::provider::ForecastSource;

/// Outcome of one ingestion pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IngestionReport {
    pub locations_ok: usize,
    pub locations_failed: usize,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
}

/// Run one ingestion pass over all configured locations, sequentially.
///
/// A provider failure (network fault, non-success response, malformed
/// payload) is scoped to its location: it is logged and that location
/// contributes zero rows, while the others proceed. A storage fault aborts
/// the whole pass.
pub async fn run_ingestion(
    store: &Store,
    source: &dyn ForecastSource,
    locations: &[LocationSpec],
) -> Result<IngestionReport> {
    let mut report = IngestionReport::default();

    for location in locations {
        let rows = match source.fetch(location).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    location = %location.name,
                    source = source.name(),
                    error = %e,
                    "Forecast fetch failed"
                );
                report.locations_failed += 1;
                continue;
            }
        };

        let inserted = store
            .insert_missing_forecasts(&location.name, &rows)
            .await?;
        report.locations_ok += 1;
        report.rows_inserted += inserted;
        report.rows_skipped += rows.len() as u64 - inserted;
    }

    info!(
        locations_ok = report.locations_ok,
        locations_failed = report.locations_failed,
        rows_inserted = report.rows_inserted,
        rows_skipped = report.rows_skipped,
        "Ingestion pass complete"
    );

    Ok(report)
}
