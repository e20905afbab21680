use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable that overrides [`LogConfig::level`] with a full
/// filter directive string.
pub const LOG_ENV: &str = "LUMEN_LOG";

/// Crates a bare level applies to.
const LUMEN_TARGETS: &[&str] = &[
    "lumen_metrics",
    "lumen_export",
    "lumen_config",
    "lumen_logging",
    "lumen_demo",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level for the lumen crates (trace, debug, info, warn, error), or
    /// a full directive string such as `warn,lumen_export=trace`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files. If None, no file logging.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(default = "default_prefix")]
    pub file_prefix: String,

    /// Log rotation: "hourly", "daily", "never".
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Whether to output JSON format.
    #[serde(default)]
    pub json_format: bool,

    /// Whether to also output to console (stdout).
    #[serde(default = "default_true")]
    pub console_output: bool,
}

fn default_level() -> String {
    "info".into()
}

fn default_prefix() -> String {
    "lumen".into()
}

fn default_rotation() -> String {
    "hourly".into()
}

fn default_true() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_level(),
            log_dir: None,
            file_prefix: default_prefix(),
            rotation: default_rotation(),
            json_format: false,
            console_output: true,
        }
    }
}

impl LogConfig {
    fn rotation(&self) -> rolling::Rotation {
        match self.rotation.as_str() {
            "daily" => rolling::Rotation::DAILY,
            "never" => rolling::Rotation::NEVER,
            // default to hourly
            _ => rolling::Rotation::HOURLY,
        }
    }

    /// A bare level applies to the lumen crates while dependencies stay at
    /// `warn`. Directive strings pass through untouched.
    pub fn filter_directives(&self) -> String {
        let level = self.level.trim();
        if level.contains(|c| c == '=' || c == ',') {
            return level.to_string();
        }
        std::iter::once("warn".to_string())
            .chain(LUMEN_TARGETS.iter().map(|t| format!("{}={}", t, level)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to create rolling file appender: {0}")]
    Appender(#[from] rolling::InitError),

    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Initialize the logging system. Should be called once at program startup.
/// Returns a guard that must be held alive for the duration of the program
/// (for the non-blocking file writer).
pub fn init_logging(
    config: &LogConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>, LoggingError> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Build console layer (boxed to unify types).
    let console_layer: Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>> =
        if config.console_output {
            if config.json_format {
                Some(Box::new(fmt::layer().json()))
            } else {
                Some(Box::new(fmt::layer()))
            }
        } else {
            None
        };

    let (file_layer, guard): (
        Option<Box<dyn tracing_subscriber::Layer<_> + Send + Sync>>,
        Option<tracing_appender::non_blocking::WorkerGuard>,
    ) = if let Some(ref log_dir) = config.log_dir {
        let file_appender = rolling::RollingFileAppender::builder()
            .rotation(config.rotation())
            .filename_prefix(&config.file_prefix)
            .filename_suffix("log")
            .build(log_dir)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json_format {
            Box::new(fmt::layer().json().with_writer(non_blocking))
        } else {
            Box::new(fmt::layer().with_ansi(false).with_writer(non_blocking))
        };

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    registry.with(console_layer).with(file_layer).try_init()?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.level, "info");
        assert_eq!(config.file_prefix, "lumen");
        assert!(config.log_dir.is_none());
        assert!(config.console_output);
        assert!(!config.json_format);
    }

    #[test]
    fn test_rotation_parsing() {
        let mut config = LogConfig::default();
        assert_eq!(config.rotation(), rolling::Rotation::HOURLY);
        config.rotation = "daily".into();
        assert_eq!(config.rotation(), rolling::Rotation::DAILY);
        config.rotation = "never".into();
        assert_eq!(config.rotation(), rolling::Rotation::NEVER);
        config.rotation = "weekly".into();
        assert_eq!(config.rotation(), rolling::Rotation::HOURLY);
    }

    #[test]
    fn test_bare_level_scoped_to_lumen_crates() {
        let config = LogConfig {
            level: "debug".into(),
            ..Default::default()
        };
        let directives = config.filter_directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("lumen_metrics=debug"));
        assert!(directives.contains("lumen_export=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_directive_string_passes_through() {
        let config = LogConfig {
            level: " info,lumen_export=trace ".into(),
            ..Default::default()
        };
        assert_eq!(config.filter_directives(), "info,lumen_export=trace");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: LogConfig = toml::from_str("level = \"debug\"\njson_format = true\n").unwrap();
        assert_eq!(config.level, "debug");
        assert!(config.json_format);
        assert_eq!(config.rotation, "hourly");
        assert!(config.console_output);
    }
}
