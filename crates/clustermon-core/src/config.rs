//! Configuration management for clustermon
//!
//! Handles loading and validation of `clustermon.toml`. Every section is
//! optional; a missing file section falls back to the defaults below.

use crate::cluster::Topology;
use crate::error::ConfigError;
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Logging settings
    #[serde(default)]
    pub logging: LogConfig,

    /// Recorder settings
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Event ingestion settings
    #[serde(default)]
    pub events: EventsConfig,

    /// Pod ingestion settings
    #[serde(default)]
    pub pods: PodsConfig,

    /// Duplicate event classifier settings
    #[serde(default)]
    pub classifier: ClassifierSettings,

    /// Run finalization settings
    #[serde(default)]
    pub run: RunConfig,
}

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Sampler tick in milliseconds
    #[serde(default = "default_sampler_interval_ms")]
    pub sampler_interval_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sampler_interval_ms: default_sampler_interval_ms(),
        }
    }
}

impl RecorderConfig {
    #[must_use]
    pub fn sampler_interval(&self) -> Duration {
        Duration::from_millis(self.sampler_interval_ms)
    }
}

fn default_sampler_interval_ms() -> u64 {
    1000
}

/// Event ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events whose newest timestamp is older than this are dropped
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: u64,

    /// Capacity of each watcher notification channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            staleness_window_secs: default_staleness_window_secs(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl EventsConfig {
    #[must_use]
    pub fn staleness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.staleness_window_secs as i64)
    }
}

fn default_staleness_window_secs() -> u64 {
    15 * 60
}

fn default_channel_capacity() -> usize {
    1024
}

/// Pod ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodsConfig {
    /// Pending pods older than this are reported by the sampler
    #[serde(default = "default_pending_warning_secs")]
    pub pending_warning_secs: u64,
}

impl Default for PodsConfig {
    fn default() -> Self {
        Self {
            pending_warning_secs: default_pending_warning_secs(),
        }
    }
}

impl PodsConfig {
    #[must_use]
    pub fn pending_warning(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_warning_secs as i64)
    }
}

fn default_pending_warning_secs() -> u64 {
    60
}

/// Which evaluator variant the run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Steady-state cluster; etcd revision allowance applies
    #[default]
    Stable,
    /// Cluster under upgrade; upgrade-only repeat patterns are allowed
    Upgrade,
}

/// Duplicate event classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Repeat count above which an unexplained event is pathological
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Count under which connection-refused probe events are tolerated on
    /// single-replica clusters
    #[serde(default = "default_single_node_threshold")]
    pub single_node_threshold: u32,

    /// Name of the test suite being executed
    #[serde(default)]
    pub test_suite: String,

    /// Stable or upgrade evaluation
    #[serde(default)]
    pub mode: RunMode,

    /// Platform to assume when no cluster client is available
    #[serde(default)]
    pub platform: Option<String>,

    /// Topology to assume when no cluster client is available
    #[serde(default)]
    pub topology: Option<Topology>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            single_node_threshold: default_single_node_threshold(),
            test_suite: String::new(),
            mode: RunMode::Stable,
            platform: None,
            topology: None,
        }
    }
}

fn default_threshold() -> u32 {
    20
}

fn default_single_node_threshold() -> u32 {
    30
}

/// Run finalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// File name prefix of interval files written by other test processes
    #[serde(default = "default_additional_events_prefix")]
    pub additional_events_prefix: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            additional_events_prefix: default_additional_events_prefix(),
        }
    }
}

fn default_additional_events_prefix() -> String {
    "AdditionalEvents__".to_string()
}

impl MonitorConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would stall ingestion or disable classification
    pub fn validate(&self) -> crate::Result<()> {
        if self.recorder.sampler_interval_ms == 0 {
            return Err(
                ConfigError::ValidationError("recorder.sampler_interval_ms must be > 0".into())
                    .into(),
            );
        }
        if self.events.channel_capacity == 0 {
            return Err(
                ConfigError::ValidationError("events.channel_capacity must be > 0".into()).into(),
            );
        }
        if self.classifier.threshold == 0 {
            return Err(
                ConfigError::ValidationError("classifier.threshold must be > 0".into()).into(),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn default_config_is_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recorder.sampler_interval(), Duration::from_secs(1));
        assert_eq!(config.events.staleness_window(), chrono::Duration::minutes(15));
        assert_eq!(config.pods.pending_warning(), chrono::Duration::minutes(1));
        assert_eq!(config.classifier.threshold, 20);
        assert_eq!(config.classifier.single_node_threshold, 30);
        assert_eq!(config.classifier.mode, RunMode::Stable);
        assert_eq!(config.run.additional_events_prefix, "AdditionalEvents__");
    }

    #[test]
    fn parses_partial_toml() {
        let config = MonitorConfig::from_toml_str(
            r#"
            [classifier]
            test_suite = "openshift/build"
            mode = "upgrade"
            topology = "SingleReplica"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.classifier.test_suite, "openshift/build");
        assert_eq!(config.classifier.mode, RunMode::Upgrade);
        assert_eq!(config.classifier.topology, Some(Topology::SingleReplica));
        assert_eq!(config.classifier.threshold, 20);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn rejects_zero_sampler_interval() {
        let err = MonitorConfig::from_toml_str("[recorder]\nsampler_interval_ms = 0").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ValidationError(_))));
    }

    #[test]
    fn reports_parse_failures() {
        let err = MonitorConfig::from_toml_str("[classifier\nthreshold = 3").unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn load_from_missing_file() {
        let err = MonitorConfig::load_from(Path::new("/nonexistent/clustermon.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clustermon.toml");
        std::fs::write(&path, "[events]\nstaleness_window_secs = 60\n").unwrap();
        let config = MonitorConfig::load_from(&path).unwrap();
        assert_eq!(config.events.staleness_window_secs, 60);
        assert_eq!(config.events.channel_capacity, 1024);
    }
}
