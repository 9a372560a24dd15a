//! Configuration management for the parkpulse pipeline
//!
//! This module handles loading and validating configuration from environment
//! variables and TOML files. Every setting has a default so the pipeline can
//! start with no configuration at all (simulation-only operation).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sources::simulation::SimulationProfile;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Acquisition scheduling configuration
    pub acquisition: AcquisitionConfig,

    /// Source adapter configuration
    pub sources: SourcesConfig,

    /// Snapshot cache configuration
    pub cache: CacheConfig,

    /// Facility registry configuration
    pub registry: RegistryConfig,

    /// Simulation curve coefficients
    pub simulation: SimulationProfile,

    /// Read API server configuration
    pub server: ServerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Acquisition scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Seconds between acquisition cycles
    pub refresh_interval_secs: u64,
}

/// Source adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Municipal pages to scrape, tried in order
    pub scrape_urls: Vec<String>,

    /// Open geodata API endpoints, tried in order
    pub geodata_urls: Vec<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Where to mirror the last successfully scraped payload, if anywhere
    pub artifact_path: Option<PathBuf>,

    /// User agent string
    pub user_agent: String,
}

/// Snapshot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Where the snapshot bundle is persisted
    pub snapshot_path: PathBuf,

    /// Age in seconds after which a bundle is flagged stale
    pub stale_threshold_secs: u64,
}

/// Facility registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RegistryConfig {
    /// Catalog TOML file. When unset the built-in catalog is used.
    pub path: Option<PathBuf>,
}

/// Read API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to
    pub bind_addr: SocketAddr,

    /// Enable permissive CORS headers
    pub enable_cors: bool,

    /// Enable per-request tracing
    pub enable_request_logging: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let refresh_interval_secs = std::env::var("PARKPULSE_REFRESH_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(900);

        let timeout_secs = std::env::var("PARKPULSE_SOURCE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let stale_threshold_secs = std::env::var("PARKPULSE_STALE_THRESHOLD_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(7200);

        let scrape_urls = env_list("PARKPULSE_SCRAPE_URLS");
        let geodata_urls = env_list("PARKPULSE_GEODATA_URLS");

        let snapshot_path = std::env::var("PARKPULSE_SNAPSHOT_PATH")
            .unwrap_or_else(|_| String::from("data/snapshot.json"))
            .into();

        // An empty value disables the artifact mirror entirely
        let artifact_path = match std::env::var("PARKPULSE_SCRAPE_ARTIFACT_PATH") {
            Ok(v) if v.is_empty() => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => Some(PathBuf::from("data/last_scrape.json")),
        };

        let registry_path = std::env::var("PARKPULSE_REGISTRY_PATH")
            .ok()
            .map(PathBuf::from);

        let bind_addr = std::env::var("PARKPULSE_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse::<SocketAddr>().ok())
            .unwrap_or_else(default_bind_addr);

        let sim_seed = std::env::var("PARKPULSE_SIM_SEED")
            .ok()
            .and_then(|v| v.parse::<u64>().ok());

        let user_agent = std::env::var("PARKPULSE_USER_AGENT")
            .unwrap_or_else(|_| format!("parkpulse/{}", env!("CARGO_PKG_VERSION")));

        let log_level =
            std::env::var("PARKPULSE_LOG_LEVEL").unwrap_or_else(|_| String::from("info"));

        let log_format =
            std::env::var("PARKPULSE_LOG_FORMAT").unwrap_or_else(|_| String::from("text"));

        let simulation = SimulationProfile {
            seed: sim_seed,
            ..SimulationProfile::default()
        };

        Ok(Self {
            acquisition: AcquisitionConfig {
                refresh_interval_secs,
            },
            sources: SourcesConfig {
                scrape_urls,
                geodata_urls,
                timeout_secs,
                artifact_path,
                user_agent,
            },
            cache: CacheConfig {
                snapshot_path,
                stale_threshold_secs,
            },
            registry: RegistryConfig {
                path: registry_path,
            },
            simulation,
            server: ServerConfig {
                bind_addr,
                enable_cors: true,
                enable_request_logging: true,
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.acquisition.refresh_interval_secs == 0 {
            anyhow::bail!("refresh_interval_secs must be greater than 0");
        }

        if self.sources.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than 0");
        }

        if self.cache.stale_threshold_secs == 0 {
            anyhow::bail!("stale_threshold_secs must be greater than 0");
        }

        for url in self
            .sources
            .scrape_urls
            .iter()
            .chain(self.sources.geodata_urls.iter())
        {
            url::Url::parse(url).with_context(|| format!("Invalid source URL: {url}"))?;
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("log format must be 'text' or 'json'");
        }

        let sim = &self.simulation;
        if sim.min_occupancy_pct >= sim.max_occupancy_pct {
            anyhow::bail!("simulation min_occupancy_pct must be below max_occupancy_pct");
        }
        if !(0.0..=100.0).contains(&sim.min_occupancy_pct)
            || !(0.0..=100.0).contains(&sim.max_occupancy_pct)
        {
            anyhow::bail!("simulation occupancy band must lie within 0-100");
        }
        if sim.jitter_pct < 0.0 {
            anyhow::bail!("simulation jitter_pct must not be negative");
        }
        if !(-12..=14).contains(&sim.utc_offset_hours) {
            anyhow::bail!("simulation utc_offset_hours must lie within -12 to 14");
        }

        Ok(())
    }

    /// Get the acquisition interval as Duration
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.acquisition.refresh_interval_secs)
    }

    /// Get the per-request source timeout as Duration
    #[must_use]
    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.sources.timeout_secs)
    }

    /// Get the staleness threshold as Duration
    #[must_use]
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.cache.stale_threshold_secs)
    }

    /// Get the scrape artifact path, treating an empty value as disabled
    #[must_use]
    pub fn scrape_artifact_path(&self) -> Option<PathBuf> {
        self.sources
            .artifact_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8642))
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 900,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            scrape_urls: Vec::new(),
            geodata_urls: Vec::new(),
            timeout_secs: 10,
            artifact_path: Some(PathBuf::from("data/last_scrape.json")),
            user_agent: format!("parkpulse/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/snapshot.json"),
            stale_threshold_secs: 7200,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: true,
            enable_request_logging: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let mut config = Config::default();
        config.acquisition.refresh_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_source_url_rejected() {
        let mut config = Config::default();
        config.sources.scrape_urls = vec![String::from("not a url")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_simulation_band_rejected() {
        let mut config = Config::default();
        config.simulation.min_occupancy_pct = 90.0;
        config.simulation.max_occupancy_pct = 20.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_utc_offset_rejected() {
        let mut config = Config::default();
        config.simulation.utc_offset_hours = 26;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duration_accessors() {
        let config = Config::default();
        assert_eq!(config.refresh_interval(), Duration::from_secs(900));
        assert_eq!(config.source_timeout(), Duration::from_secs(10));
        assert_eq!(config.stale_threshold(), Duration::from_secs(7200));
    }

    #[test]
    fn test_empty_artifact_path_disables_mirror() {
        let mut config = Config::default();
        assert!(config.scrape_artifact_path().is_some());

        config.sources.artifact_path = Some(PathBuf::new());
        assert!(config.scrape_artifact_path().is_none());

        config.sources.artifact_path = None;
        assert!(config.scrape_artifact_path().is_none());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("PARKPULSE_REFRESH_INTERVAL_SECS", "60");
        std::env::set_var(
            "PARKPULSE_SCRAPE_URLS",
            "https://example.com/a, https://example.com/b",
        );
        std::env::set_var("PARKPULSE_SIM_SEED", "42");

        let config = Config::from_env().unwrap();
        assert_eq!(config.acquisition.refresh_interval_secs, 60);
        assert_eq!(config.sources.scrape_urls.len(), 2);
        assert_eq!(config.sources.scrape_urls[1], "https://example.com/b");
        assert_eq!(config.simulation.seed, Some(42));

        std::env::remove_var("PARKPULSE_REFRESH_INTERVAL_SECS");
        std::env::remove_var("PARKPULSE_SCRAPE_URLS");
        std::env::remove_var("PARKPULSE_SIM_SEED");
    }

    #[test]
    #[serial]
    fn test_env_defaults_when_unset() {
        std::env::remove_var("PARKPULSE_REFRESH_INTERVAL_SECS");
        std::env::remove_var("PARKPULSE_BIND_ADDR");

        let config = Config::from_env().unwrap();
        assert_eq!(config.acquisition.refresh_interval_secs, 900);
        assert_eq!(config.server.bind_addr.port(), 8642);
        assert!(config.sources.scrape_urls.is_empty());
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[acquisition]
refresh_interval_secs = 120

[cache]
snapshot_path = "tmp/bundle.json"
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.acquisition.refresh_interval_secs, 120);
        assert_eq!(config.cache.snapshot_path, PathBuf::from("tmp/bundle.json"));
        // Untouched sections fall back to defaults
        assert_eq!(config.cache.stale_threshold_secs, 7200);
        assert!(config.validate().is_ok());
    }
}
