//! Pipeline settings with environment overrides.

use std::env;
use std::path::PathBuf;

use crate::{EntityKey, ResampleStrategy, ResamplingConfig, TemporalConfig};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub fraud_file: String,
    pub ip_country_file: String,
    pub creditcard_file: String,
    pub temporal: TemporalConfig,
    pub resampling: ResamplingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/raw"),
            fraud_file: "Fraud_Data.csv".to_string(),
            ip_country_file: "ipAddress_to_Country.csv".to_string(),
            creditcard_file: "creditcard.csv".to_string(),
            temporal: TemporalConfig::default(),
            resampling: ResamplingConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn fraud_path(&self) -> PathBuf {
        self.data_dir.join(&self.fraud_file)
    }

    pub fn ip_country_path(&self) -> PathBuf {
        self.data_dir.join(&self.ip_country_file)
    }

    pub fn creditcard_path(&self) -> PathBuf {
        self.data_dir.join(&self.creditcard_file)
    }
}

/// Builds a [`PipelineConfig`] from `FRAUDPREP_*` variables. Unset, empty or
/// unparsable values keep their defaults.
pub fn pipeline_config_from_env() -> PipelineConfig {
    let mut config = PipelineConfig::default();

    if let Some(dir) = non_empty_var("FRAUDPREP_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(file) = non_empty_var("FRAUDPREP_FRAUD_FILE") {
        config.fraud_file = file;
    }
    if let Some(file) = non_empty_var("FRAUDPREP_IP_COUNTRY_FILE") {
        config.ip_country_file = file;
    }
    if let Some(file) = non_empty_var("FRAUDPREP_CREDITCARD_FILE") {
        config.creditcard_file = file;
    }
    if let Some(hours) = non_empty_var("FRAUDPREP_WINDOW_HOURS")
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|hours| *hours > 0)
    {
        config.temporal.window_hours = hours;
    }
    if let Some(entity) = non_empty_var("FRAUDPREP_ENTITY_KEY").and_then(|raw| parse_entity(&raw)) {
        config.temporal.entity = entity;
    }
    if let Some(strategy) =
        non_empty_var("FRAUDPREP_RESAMPLE").and_then(|raw| parse_strategy(&raw))
    {
        config.resampling.strategy = strategy;
    }
    if let Some(seed) = non_empty_var("FRAUDPREP_SEED").and_then(|raw| raw.parse::<u64>().ok()) {
        config.resampling.seed = seed;
    }
    if let Some(k) = non_empty_var("FRAUDPREP_SMOTE_NEIGHBORS")
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|k| *k > 0)
    {
        config.resampling.smote_neighbors = k;
    }

    config
}

pub(crate) fn non_empty_var(key: &str) -> Option<String> {
    let raw = env::var(key).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_entity(raw: &str) -> Option<EntityKey> {
    match raw.to_ascii_lowercase().as_str() {
        "user" | "user_id" => Some(EntityKey::UserId),
        "device" | "device_id" => Some(EntityKey::DeviceId),
        _ => None,
    }
}

fn parse_strategy(raw: &str) -> Option<ResampleStrategy> {
    match raw.to_ascii_lowercase().as_str() {
        "none" | "off" => Some(ResampleStrategy::None),
        "undersample" | "under" => Some(ResampleStrategy::Undersample),
        "smote" => Some(ResampleStrategy::Smote),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    pub(crate) fn with_env_vars<R>(vars: &[(&str, Option<&str>)], f: impl FnOnce() -> R) -> R {
        let _guard = env_lock()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous: Vec<(String, Option<String>)> = vars
            .iter()
            .map(|(key, _)| ((*key).to_string(), env::var(key).ok()))
            .collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let output = f();

        for (key, value) in previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        output
    }
}
