//! Workflow configuration persistence and environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::schema::DataFrequency;
use crate::types::S3Uri;

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_PROJECT: &str = "coldstart";
pub const DEEP_AR_PLUS_ARN: &str = "arn:aws:forecast:::algorithm/Deep_AR_Plus";

/// How the lifecycle waiter polls remote resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// `None` waits until a terminal state or external interruption.
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: Option<u64>,
}

fn default_interval_secs() -> u64 {
    30
}
fn default_max_wait_secs() -> Option<u64> {
    Some(8 * 3600)
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

/// Which items are treated as cold-start items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdStartSettings {
    /// Explicit item ids. Takes precedence over `count`.
    #[serde(default)]
    pub items: Vec<String>,
    /// Number of items to hold out when `items` is empty.
    #[serde(default = "default_cold_count")]
    pub count: usize,
}

fn default_cold_count() -> usize {
    1
}

impl Default for ColdStartSettings {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            count: default_cold_count(),
        }
    }
}

/// Top-level Coldcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColdcastConfig {
    /// Prefix for every remote resource name.
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Staging bucket for input CSVs and forecast exports.
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_project")]
    pub key_prefix: String,
    /// IAM role the service assumes to read/write the bucket. Provisioned externally.
    #[serde(default)]
    pub role_arn: String,
    /// Overrides for the service endpoints (e.g. a local emulator).
    #[serde(default)]
    pub forecast_endpoint: Option<String>,
    #[serde(default)]
    pub forecast_query_endpoint: Option<String>,
    #[serde(default)]
    pub s3_endpoint: Option<String>,
    #[serde(default = "default_frequency")]
    pub data_frequency: DataFrequency,
    #[serde(default = "default_horizon")]
    pub forecast_horizon: u32,
    #[serde(default = "default_algorithm")]
    pub algorithm_arn: String,
    #[serde(default = "default_forecast_types")]
    pub forecast_types: Vec<String>,
    #[serde(default)]
    pub poll: PollSettings,
    #[serde(default)]
    pub cold_start: ColdStartSettings,
    /// Input target time series CSV.
    #[serde(default = "default_series_file")]
    pub target_series_file: PathBuf,
    /// Input item metadata CSV.
    #[serde(default = "default_metadata_file")]
    pub item_metadata_file: PathBuf,
    /// Local working directory (prepared CSVs, ledger, downloaded exports).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Path to config file for saving.
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_project() -> String {
    DEFAULT_PROJECT.into()
}
fn default_region() -> String {
    DEFAULT_REGION.into()
}
fn default_frequency() -> DataFrequency {
    DataFrequency::Daily
}
fn default_horizon() -> u32 {
    30
}
fn default_algorithm() -> String {
    DEEP_AR_PLUS_ARN.into()
}
fn default_forecast_types() -> Vec<String> {
    vec!["0.1".into(), "0.5".into(), "0.9".into()]
}
fn default_series_file() -> PathBuf {
    PathBuf::from("data/target_time_series.csv")
}
fn default_metadata_file() -> PathBuf {
    PathBuf::from("data/item_metadata.csv")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("work")
}

impl Default for ColdcastConfig {
    fn default() -> Self {
        Self {
            project: default_project(),
            region: default_region(),
            bucket: String::new(),
            key_prefix: default_project(),
            role_arn: String::new(),
            forecast_endpoint: None,
            forecast_query_endpoint: None,
            s3_endpoint: None,
            data_frequency: default_frequency(),
            forecast_horizon: default_horizon(),
            algorithm_arn: default_algorithm(),
            forecast_types: default_forecast_types(),
            poll: PollSettings::default(),
            cold_start: ColdStartSettings::default(),
            target_series_file: default_series_file(),
            item_metadata_file: default_metadata_file(),
            data_dir: default_data_dir(),
            config_path: PathBuf::new(),
        }
    }
}

impl ColdcastConfig {
    /// Load config from file (if present), then apply environment overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let mut config: ColdcastConfig = match std::fs::read_to_string(config_path) {
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e.into()),
        };
        config.config_path = config_path.to_path_buf();
        config.apply_env();
        Ok(config)
    }

    /// Environment variables win over file values.
    pub fn apply_env(&mut self) {
        if let Ok(region) = std::env::var("AWS_REGION") {
            self.region = region;
        }
        if let Ok(bucket) = std::env::var("COLDCAST_BUCKET") {
            self.bucket = bucket;
        }
        if let Ok(role) = std::env::var("COLDCAST_ROLE_ARN") {
            self.role_arn = role;
        }
        if let Ok(dir) = std::env::var("COLDCAST_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.config_path, json)?;
        info!("Saved config to {}", self.config_path.display());
        Ok(())
    }

    /// Check the fields every remote run needs.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.is_empty() {
            return Err(Error::Config("bucket is not set (COLDCAST_BUCKET)".into()));
        }
        if self.role_arn.is_empty() {
            return Err(Error::Config("role_arn is not set (COLDCAST_ROLE_ARN)".into()));
        }
        if self.forecast_horizon == 0 {
            return Err(Error::Config("forecast_horizon must be positive".into()));
        }
        if self.poll.interval_secs == 0 {
            return Err(Error::Config("poll.interval_secs must be positive".into()));
        }
        if !self
            .project
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::Config(format!(
                "project name may only contain letters, digits and '_': {}",
                self.project
            )));
        }
        Ok(())
    }

    /// Staging location for a named input file.
    pub fn staging_uri(&self, file_name: &str) -> S3Uri {
        S3Uri::new(self.bucket.clone(), self.key_prefix.clone()).join(file_name)
    }

    /// Destination prefix for the forecast export.
    pub fn export_uri(&self) -> S3Uri {
        S3Uri::new(self.bucket.clone(), self.key_prefix.clone()).join("export")
    }

    /// Remote resource name scoped to this project.
    pub fn resource_name(&self, suffix: &str) -> String {
        format!("{}_{}", self.project, suffix)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ColdcastConfig {
        ColdcastConfig {
            bucket: "bucket".into(),
            role_arn: "arn:aws:iam::1:role/ForecastRole".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coldcast.json");
        std::fs::write(&path, r#"{"project": "demo", "data_frequency": "H"}"#).unwrap();

        let config = ColdcastConfig::load(&path).unwrap();
        assert_eq!(config.project, "demo");
        assert_eq!(config.data_frequency, DataFrequency::Hourly);
        assert_eq!(config.forecast_horizon, 30);
        assert_eq!(config.algorithm_arn, DEEP_AR_PLUS_ARN);
        assert_eq!(config.poll.interval_secs, 30);
        assert_eq!(config.cold_start.count, 1);
        assert_eq!(config.config_path, path);
    }

    #[test]
    fn test_cold_start_section_defaults_to_one_item() {
        assert_eq!(ColdStartSettings::default().count, 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coldcast.json");
        std::fs::write(&path, r#"{"bucket": "b", "cold_start": {"items": []}}"#).unwrap();
        let config = ColdcastConfig::load(&path).unwrap();
        assert!(config.cold_start.items.is_empty());
        assert_eq!(config.cold_start.count, 1);

        std::fs::write(&path, r#"{"bucket": "b"}"#).unwrap();
        let config = ColdcastConfig::load(&path).unwrap();
        assert_eq!(config.cold_start.count, 1);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ColdcastConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.forecast_types, vec!["0.1", "0.5", "0.9"]);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(ColdcastConfig::load(&path), Err(Error::Json(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = valid_config();
        config.config_path = dir.path().join("nested").join("coldcast.json");
        config.forecast_horizon = 14;
        config.save().unwrap();

        let reloaded: ColdcastConfig =
            serde_json::from_str(&std::fs::read_to_string(&config.config_path).unwrap()).unwrap();
        assert_eq!(reloaded.forecast_horizon, 14);
        assert_eq!(reloaded.bucket, "bucket");
    }

    #[test]
    fn test_validate() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.bucket.clear();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = valid_config();
        config.project = "has-dash".into();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.poll.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_uris_and_names() {
        let config = valid_config();
        assert_eq!(
            config.staging_uri("train.csv").to_string(),
            "s3://bucket/coldstart/train.csv"
        );
        assert_eq!(config.export_uri().to_string(), "s3://bucket/coldstart/export");
        assert_eq!(config.resource_name("dsg"), "coldstart_dsg");
    }
}
