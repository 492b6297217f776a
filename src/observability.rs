//! Shared logging configuration and initialization.

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{non_empty_var, parse_bool};
use crate::{PipelineConfig, PipelineEvent, PipelineObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Some(level) = non_empty_var("FRAUDPREP_LOG_LEVEL") {
        config.level = level;
    }

    if let Some(format) = non_empty_var("FRAUDPREP_LOG_FORMAT").and_then(|raw| parse_log_format(&raw))
    {
        config.format = format;
    }

    if let Some(include_target) =
        non_empty_var("FRAUDPREP_LOG_TARGET").and_then(|raw| parse_bool(&raw))
    {
        config.include_target = include_target;
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_pipeline_start(config: &PipelineConfig) {
    info!(
        component = "pipeline",
        event = "pipeline.start",
        data_dir = %config.data_dir.display(),
        window_hours = config.temporal.window_hours,
        entity = config.temporal.entity.as_str(),
        resample = ?config.resampling.strategy,
        seed = config.resampling.seed
    );
}

/// Forwards pipeline events to `tracing`. Data-quality problems are logged at
/// `warn`, everything else at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_event(&self, event: &PipelineEvent) {
        let name = event.name();
        match event {
            PipelineEvent::RowsLoaded {
                dataset,
                rows,
                columns,
            } => info!(
                component = "loader",
                event = name,
                dataset = dataset.as_str(),
                rows,
                columns
            ),
            PipelineEvent::UnparsableTimestamps {
                dataset,
                column,
                count,
            } => warn!(
                component = "loader",
                event = name,
                dataset = dataset.as_str(),
                column = %column,
                count
            ),
            PipelineEvent::DuplicatesRemoved {
                dataset,
                original,
                removed,
            } => info!(
                component = "cleaning",
                event = name,
                dataset = dataset.as_str(),
                original,
                removed
            ),
            PipelineEvent::RangesSkipped { count } => {
                warn!(component = "geolocation", event = name, count)
            }
            PipelineEvent::OverlappingRanges { count } => {
                warn!(component = "geolocation", event = name, count)
            }
            PipelineEvent::CountryMerged {
                matched,
                missing_address,
                outside_ranges,
            } => info!(
                component = "geolocation",
                event = name,
                matched,
                missing_address,
                outside_ranges
            ),
            PipelineEvent::CountryFilled { count } => {
                info!(component = "cleaning", event = name, count)
            }
            PipelineEvent::TimeFeaturesAdded {
                dataset,
                rows,
                missing_timestamps,
            } => info!(
                component = "temporal",
                event = name,
                dataset = dataset.as_str(),
                rows,
                missing_timestamps
            ),
            PipelineEvent::ColumnsScaled { columns } => {
                info!(component = "preprocess", event = name, columns = ?columns)
            }
            PipelineEvent::ColumnsEncoded { columns, produced } => info!(
                component = "preprocess",
                event = name,
                columns = ?columns,
                produced
            ),
            PipelineEvent::Resampled {
                strategy,
                before,
                after,
            } => info!(
                component = "resample",
                event = name,
                strategy = %strategy,
                before,
                after
            ),
        }
    }
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_env::with_env_vars;

    #[test]
    fn defaults_when_env_missing() {
        let cfg = with_env_vars(
            &[
                ("FRAUDPREP_LOG_LEVEL", None),
                ("FRAUDPREP_LOG_FORMAT", None),
                ("FRAUDPREP_LOG_TARGET", None),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn parses_json_and_level_and_target_from_env() {
        let cfg = with_env_vars(
            &[
                ("FRAUDPREP_LOG_LEVEL", Some("debug")),
                ("FRAUDPREP_LOG_FORMAT", Some("json")),
                ("FRAUDPREP_LOG_TARGET", Some("false")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn invalid_format_or_target_falls_back_to_defaults() {
        let cfg = with_env_vars(
            &[
                ("FRAUDPREP_LOG_LEVEL", Some("trace")),
                ("FRAUDPREP_LOG_FORMAT", Some("yaml")),
                ("FRAUDPREP_LOG_TARGET", Some("maybe")),
            ],
            logging_config_from_env,
        );

        assert_eq!(cfg.level, "trace");
        assert_eq!(cfg.format, LogFormat::Pretty);
        assert!(cfg.include_target);
    }
}
