use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use weather_pipeline::config::{AppConfig, PipelineMode};
use weather_pipeline::db::store::Store;
use weather_pipeline::monitoring::dashboard::{self, DashboardState};
use weather_pipeline::monitoring::logger;
use weather_pipeline::provider::MeteomaticsClient;
use weather_pipeline::{pipeline, registry};

#[derive(Parser)]
#[command(about = "Forecast ingestion and aggregation pipeline")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/default.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let (config, secrets) = AppConfig::load(&args.config)?;

    logger::init_logging(&config.monitoring)?;

    tracing::info!(
        mode = ?config.pipeline.mode,
        locations = config.locations.len(),
        "Weather pipeline starting"
    );

    let credentials = secrets.require_provider()?;
    let store = Arc::new(Store::new(&config.database.path).await?);

    registry::ensure(&store, &config.locations).await?;

    let client = MeteomaticsClient::new(&config.provider, credentials)?;
    pipeline::run_ingestion(&store, &client, &config.locations).await?;

    match config.pipeline.mode {
        PipelineMode::Ingest => Ok(()),
        PipelineMode::Serve => {
            let state = DashboardState::new(store);
            dashboard::serve(state, &config.server.bind, config.server.port).await
        }
    }
}
