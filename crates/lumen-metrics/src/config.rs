use lumen_config::{from_toml_serde, render_serde, Config, ConfigError};
use serde::{Deserialize, Serialize};

use crate::labels::LabelLimits;

/// SDK-wide settings, read by the provider at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdkConfig {
    /// Used by histograms created without explicit boundaries.
    #[serde(default = "default_histogram_boundaries")]
    pub default_histogram_boundaries: Vec<f64>,
    #[serde(default)]
    pub labels: LabelLimits,
}

pub fn default_histogram_boundaries() -> Vec<f64> {
    vec![
        0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0,
        7500.0, 10000.0,
    ]
}

impl Default for SdkConfig {
    fn default() -> Self {
        Self {
            default_histogram_boundaries: default_histogram_boundaries(),
            labels: LabelLimits::default(),
        }
    }
}

impl Config for SdkConfig {
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError> {
        from_toml_serde(value)
    }

    // Read once when the provider is built; nothing here is hot-updatable.
    fn hot_update(&mut self, _other: &Self) {}

    fn render(&self) -> String {
        render_serde(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let boundaries = &self.default_histogram_boundaries;
        if let Some(bad) = boundaries.iter().find(|b| !b.is_finite()) {
            return Err(ConfigError::Invalid {
                field: "default_histogram_boundaries".into(),
                reason: format!("non-finite boundary {}", bad),
            });
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid {
                field: "default_histogram_boundaries".into(),
                reason: "boundaries must be strictly ascending".into(),
            });
        }
        for (field, value) in [
            ("labels.max_key_len", self.labels.max_key_len),
            ("labels.max_value_len", self.labels.max_value_len),
            ("labels.max_labels", self.labels.max_labels),
        ] {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    field: field.into(),
                    value: value.to_string(),
                    min: Some("1".into()),
                    max: None,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = SdkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_histogram_boundaries.len(), 15);
    }

    #[test]
    fn test_from_toml_partial() {
        let value: toml::Value = r#"
            default_histogram_boundaries = [1.0, 2.0, 4.0]

            [labels]
            max_labels = 8
        "#
        .parse()
        .unwrap();
        let config = SdkConfig::from_toml(&value).unwrap();
        assert_eq!(config.default_histogram_boundaries, vec![1.0, 2.0, 4.0]);
        assert_eq!(config.labels.max_labels, 8);
        assert_eq!(config.labels.max_key_len, 255);
    }

    #[test]
    fn test_validate_rejects_unsorted_boundaries() {
        let config = SdkConfig {
            default_histogram_boundaries: vec![5.0, 1.0],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = SdkConfig::default();
        config.labels.max_labels = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_hot_update_is_ignored() {
        let mut current = SdkConfig::default();
        let mut incoming = SdkConfig {
            default_histogram_boundaries: vec![1.0],
            ..Default::default()
        };
        incoming.labels.max_value_len = 16;
        current.hot_update(&incoming);
        assert_eq!(current, SdkConfig::default());
    }

    #[test]
    fn test_render_round_trip() {
        let config = SdkConfig::default();
        let value: toml::Value = config.render().parse().unwrap();
        assert_eq!(SdkConfig::from_toml(&value).unwrap(), config);
    }
}
