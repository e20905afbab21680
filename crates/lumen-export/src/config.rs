//! Configuration for the export pipeline.

use lumen_config::{from_toml_serde, render_serde, Config, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterType {
    Log,
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_exporter_type")]
    pub exporter_type: ExporterType,

    /// Number of export worker tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum number of metrics buffered between collection and export.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum number of metrics handed to the exporter in one call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Instrument names that are collected but never exported.
    #[serde(default)]
    pub blacklisted_metric_names: HashSet<String>,

    /// JSON-lines output, only used by the file exporter.
    #[serde(default = "default_export_path")]
    pub export_path: String,

    #[serde(default = "default_collect_interval_ms")]
    pub collect_interval_ms: u64,
}

fn default_exporter_type() -> ExporterType {
    ExporterType::Log
}

fn default_workers() -> usize {
    2
}

fn default_queue_capacity() -> usize {
    4096
}

fn default_batch_size() -> usize {
    256
}

fn default_export_path() -> String {
    "./metrics_export/metrics.jsonl".to_string()
}

fn default_collect_interval_ms() -> u64 {
    10_000
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            exporter_type: default_exporter_type(),
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            blacklisted_metric_names: HashSet::new(),
            export_path: default_export_path(),
            collect_interval_ms: default_collect_interval_ms(),
        }
    }
}

impl ExportConfig {
    pub fn is_blacklisted(&self, name: &str) -> bool {
        self.blacklisted_metric_names.contains(name)
    }

    pub fn collect_interval(&self) -> Duration {
        Duration::from_millis(self.collect_interval_ms)
    }
}

impl Config for ExportConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_serde(value)
    }

    fn hot_update(&mut self, other: &Self) {
        self.blacklisted_metric_names = other.blacklisted_metric_names.clone();
    }

    fn render(&self) -> String {
        render_serde(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value, min) in [
            ("workers", self.workers as u64, 1),
            ("queue_capacity", self.queue_capacity as u64, 1),
            ("batch_size", self.batch_size as u64, 1),
            ("collect_interval_ms", self.collect_interval_ms, 10),
        ] {
            if value < min {
                return Err(ConfigError::OutOfRange {
                    field: field.into(),
                    value: value.to_string(),
                    min: Some(min.to_string()),
                    max: None,
                });
            }
        }
        if self.exporter_type == ExporterType::File && self.export_path.is_empty() {
            return Err(ConfigError::Invalid {
                field: "export_path".into(),
                reason: "required by the file exporter".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExportConfig::default();
        assert_eq!(config.exporter_type, ExporterType::Log);
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_capacity, 4096);
        assert_eq!(config.batch_size, 256);
        assert_eq!(config.collect_interval(), Duration::from_secs(10));
        assert!(config.blacklisted_metric_names.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blacklist() {
        let mut config = ExportConfig::default();
        config
            .blacklisted_metric_names
            .insert("internal.debug_counter".to_string());

        assert!(config.is_blacklisted("internal.debug_counter"));
        assert!(!config.is_blacklisted("user.request_count"));
    }

    #[test]
    fn test_from_toml() {
        let value: toml::Value = r#"
            exporter_type = "file"
            workers = 4
            blacklisted_metric_names = ["noisy"]
        "#
        .parse()
        .unwrap();
        let config = ExportConfig::from_toml(&value).unwrap();
        assert_eq!(config.exporter_type, ExporterType::File);
        assert_eq!(config.workers, 4);
        assert!(config.is_blacklisted("noisy"));
        assert_eq!(config.batch_size, 256);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = ExportConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_hot_update_blacklist_only() {
        let mut current = ExportConfig::default();
        let mut incoming = ExportConfig {
            workers: 16,
            ..Default::default()
        };
        incoming.blacklisted_metric_names.insert("x".into());
        current.hot_update(&incoming);
        assert!(current.is_blacklisted("x"));
        assert_eq!(current.workers, 2);
    }
}
