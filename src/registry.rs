//! Location registry seeding.

use anyhow::Result;
use tracing::info;

use crate::config::LocationSpec;
use crate::db::store::Store;

/// Idempotently guarantee every configured location exists in storage.
/// Entries whose name or coordinate pair is already registered are skipped
/// without error; only a storage fault fails.
pub async fn ensure(store: &Store, locations: &[LocationSpec]) -> Result<()> {
    for location in locations {
        store
            .ensure_location(&location.name, &location.coordinates())
            .await?;
    }

    let registered = store.count_locations().await?;
    info!(configured = locations.len(), registered, "Location registry ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, latitude: f64, longitude: f64) -> LocationSpec {
        LocationSpec {
            name: name.to_string(),
            latitude,
            longitude,
        }
    }

    #[tokio::test]
    async fn test_ensure_seeds_and_reruns_cleanly() {
        let store = Store::new(":memory:").await.expect("should create store");
        let locations = vec![
            spec("Kastoria", 40.5193, 21.2682),
            spec("Athens", 37.9838, 23.7275),
        ];

        ensure(&store, &locations).await.expect("first run");
        ensure(&store, &locations).await.expect("second run");

        assert_eq!(store.count_locations().await.unwrap(), 2);
    }
}
