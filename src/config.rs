use std::path::Path;

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub provider: ProviderConfig,
    pub database: DatabaseConfig,
    pub monitoring: MonitoringConfig,
    pub server: ServerConfig,
    pub locations: Vec<LocationSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// Run one ingestion pass and exit.
    Ingest,
    /// Run one ingestion pass, then serve the read-only JSON API.
    Serve,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

/// A location tracked for forecasting, as configured at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationSpec {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationSpec {
    /// Canonical `"lat,lon"` rendering, used both as the unique storage key
    /// and in provider request paths.
    pub fn coordinates(&self) -> String {
        format!("{},{}", self.latitude, self.longitude)
    }
}

/// Secrets loaded exclusively from environment variables.
/// Not serializable, not stored in config files.
pub struct Secrets {
    pub meteomatics_username: Option<String>,
    pub meteomatics_password: Option<SecretString>,
}

/// Basic-auth credentials for the forecast provider.
pub struct ProviderCredentials {
    pub username: String,
    pub password: SecretString,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            meteomatics_username: std::env::var("METEOMATICS_USERNAME").ok(),
            meteomatics_password: std::env::var("METEOMATICS_PASSWORD")
                .ok()
                .map(SecretString::from),
        }
    }

    /// Provider credentials are mandatory; their absence is a startup fault.
    pub fn require_provider(self) -> Result<ProviderCredentials> {
        let username = self
            .meteomatics_username
            .context("METEOMATICS_USERNAME is not set")?;
        let password = self
            .meteomatics_password
            .context("METEOMATICS_PASSWORD is not set")?;
        Ok(ProviderCredentials { username, password })
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, overlaying environment variables
    /// for secrets.
    pub fn load(config_path: &Path) -> Result<(Self, Secrets)> {
        dotenvy::dotenv().ok();

        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        if config.locations.is_empty() {
            bail!("Config lists no locations — at least one is required");
        }

        let secrets = Secrets::from_env();

        Ok((config, secrets))
    }
}
