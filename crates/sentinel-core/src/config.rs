//! Service configuration.
//!
//! Loaded from a YAML file, then overlaid with environment variables:
//! - `PORT` - HTTP listen port
//! - `SENTINEL_DATA_DIR` - directory holding the log files
//! - `SENTINEL_POLL_INTERVAL_MS` - tailing poll interval

use crate::{types::Channel, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default trailing window length
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Default standard-deviation multiplier for the anomaly threshold
pub const DEFAULT_THRESHOLD_MULTIPLIER: f64 = 2.0;

/// Default delay between tailing polls that found nothing new
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub detection: DetectionSettings,
    pub storage: StorageConfig,
    pub streaming: StreamingConfig,
    pub generator: GeneratorConfig,
}

impl Config {
    /// Load configuration from a YAML file and apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read {:?}: {}", path, e)))?;

        let mut config: Config = serde_yaml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse {:?}: {}", path, e)))?;

        config.apply_env();
        config.validate()?;
        debug!(path = ?path, "Configuration file parsed");
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from environment variables
    pub fn apply_env(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }

        if let Ok(dir) = std::env::var("SENTINEL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Some(ms) = std::env::var("SENTINEL_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.streaming.poll_interval_ms = ms;
        }
    }

    /// Check invariants the rest of the system relies on
    pub fn validate(&self) -> Result<()> {
        if self.detection.window_size < 2 {
            return Err(Error::config(format!(
                "detection.window_size must be at least 2, got {}",
                self.detection.window_size
            )));
        }
        if !self.detection.threshold_multiplier.is_finite() {
            return Err(Error::config("detection.threshold_multiplier must be finite"));
        }
        if self.streaming.poll_interval_ms == 0 {
            return Err(Error::config("streaming.poll_interval_ms must be positive"));
        }
        if self.streaming.keep_alive_secs == 0 {
            return Err(Error::config("streaming.keep_alive_secs must be positive"));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(Error::config("server.request_timeout_secs must be positive"));
        }
        if !self.server.metrics_path.starts_with('/') {
            return Err(Error::config(format!(
                "server.metrics_path must start with '/', got {:?}",
                self.server.metrics_path
            )));
        }
        if self.storage.data_log == self.storage.anomaly_log {
            return Err(Error::config(
                "storage.data_log and storage.anomaly_log must be different files",
            ));
        }
        self.generator.validate()
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
    /// Route serving Prometheus metrics
    pub metrics_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            request_timeout_secs: 30,
            cors_origins: vec!["*".to_string()],
            metrics_path: "/metrics".to_string(),
        }
    }
}

/// Detector parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// Number of recent values the statistics are computed over
    pub window_size: usize,
    /// k in `mean + k * std_dev`
    pub threshold_multiplier: f64,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            threshold_multiplier: DEFAULT_THRESHOLD_MULTIPLIER,
        }
    }
}

/// Append-log file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub data_log: String,
    pub anomaly_log: String,
    /// fsync after every append
    pub fsync: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            data_log: "data.log".to_string(),
            anomaly_log: "anomalies.log".to_string(),
            fsync: true,
        }
    }
}

impl StorageConfig {
    /// File backing a channel
    pub fn path_for(&self, channel: Channel) -> PathBuf {
        match channel {
            Channel::Data => self.data_dir.join(&self.data_log),
            Channel::Anomalies => self.data_dir.join(&self.anomaly_log),
        }
    }
}

/// Live stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    pub poll_interval_ms: u64,
    /// SSE keep-alive comment interval
    pub keep_alive_secs: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            keep_alive_secs: 15,
        }
    }
}

impl StreamingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Synthetic sample producer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Delay between generated samples
    pub interval_ms: u64,
    /// Normal values are drawn uniformly from `[value_min, value_max)`
    pub value_min: f64,
    pub value_max: f64,
    /// Chance that an outlier offset is added to a sample
    pub anomaly_probability: f64,
    /// Outlier offset is an integer drawn from `[outlier_min, outlier_max]`
    pub outlier_min: u32,
    pub outlier_max: u32,
    /// Detect endpoint used by the HTTP sink
    pub target_url: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            value_min: 40.0,
            value_max: 50.0,
            anomaly_probability: 0.1,
            outlier_min: 10,
            outlier_max: 20,
            target_url: "http://localhost:8001/detect".to_string(),
        }
    }
}

impl GeneratorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(Error::config("generator.interval_ms must be positive"));
        }
        if !(self.value_min < self.value_max) {
            return Err(Error::config(format!(
                "generator.value_min ({}) must be below generator.value_max ({})",
                self.value_min, self.value_max
            )));
        }
        if !(0.0..=1.0).contains(&self.anomaly_probability) {
            return Err(Error::config(format!(
                "generator.anomaly_probability must be within [0, 1], got {}",
                self.anomaly_probability
            )));
        }
        if self.outlier_min > self.outlier_max {
            return Err(Error::config(
                "generator.outlier_min must not exceed generator.outlier_max",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.detection.window_size, 10);
        assert_eq!(config.detection.threshold_multiplier, 2.0);
        assert_eq!(config.streaming.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.storage.path_for(Channel::Data), PathBuf::from("./data.log"));
        assert_eq!(
            config.storage.path_for(Channel::Anomalies),
            PathBuf::from("./anomalies.log")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "detection:\n  window_size: 20\nserver:\n  host: 127.0.0.1").unwrap();

        let config: Config =
            serde_yaml::from_str(&std::fs::read_to_string(file.path()).unwrap()).unwrap();
        assert_eq!(config.detection.window_size, 20);
        assert_eq!(config.detection.threshold_multiplier, 2.0);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8001);
    }

    #[test]
    fn test_window_size_too_small() {
        let mut config = Config::default();
        config.detection.window_size = 1;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_same_log_file_rejected() {
        let mut config = Config::default();
        config.storage.anomaly_log = config.storage.data_log.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generator_probability_bounds() {
        let mut config = Config::default();
        config.generator.anomaly_probability = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_durations_rejected() {
        let mut config = Config::default();
        config.generator.interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.streaming.keep_alive_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.server.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.streaming.poll_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_interval_in_yaml_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "generator:\n  interval_ms: 0").unwrap();
        assert!(matches!(Config::from_file(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_metrics_path_must_be_absolute() {
        let mut config = Config::default();
        config.server.metrics_path = "metrics".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let result = Config::from_file("/nonexistent/sentinel.yaml");
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
