//! Configuration plumbing shared by the lumen crates.
//!
//! Every component config implements [`Config`]: it can be parsed from a TOML
//! table, validated, rendered back to TOML, and partially hot-updated. The
//! [`ConfigManager`] holds the active value behind an `ArcSwap` so readers never
//! block a reload.

pub mod manager;

pub use manager::ConfigManager;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("render error: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("type mismatch for `{field}`: expected {expected}")]
    TypeMismatch { field: String, expected: String },

    #[error("value {value} out of range for `{field}` (min: {min:?}, max: {max:?})")]
    OutOfRange {
        field: String,
        value: String,
        min: Option<String>,
        max: Option<String>,
    },

    #[error("invalid `{field}`: {reason}")]
    Invalid { field: String, reason: String },
}

/// A loadable, validatable configuration section.
pub trait Config: Sized + Send + Sync + 'static {
    /// Build the config from a parsed TOML value. Missing fields take defaults.
    fn from_toml(value: &toml::Value) -> Result<Self, ConfigError>;

    /// Copy the hot-updatable fields of `other` into `self`.
    fn hot_update(&mut self, other: &Self);

    /// Render the config as TOML text.
    fn render(&self) -> String;

    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

/// Parse a serde-derived config out of a TOML value.
pub fn from_toml_serde<T: DeserializeOwned>(value: &toml::Value) -> Result<T, ConfigError> {
    Ok(value.clone().try_into()?)
}

/// Render a serde-derived config as TOML, falling back to an empty document if
/// the value holds something TOML cannot express.
pub fn render_serde<T: Serialize>(value: &T) -> String {
    match toml::to_string_pretty(value) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "failed to render config");
            String::new()
        }
    }
}
