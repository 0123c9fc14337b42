//! Runtime configuration for the revenue core

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::ConfigurationError;

/// Prefix of the environment overrides
pub const ENV_PREFIX: &str = "HOTEL_REVENUE_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Revenue core configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RevenueConfig {
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
    pub schema: SchemaConfig,
    pub encoding: EncodingConfig,
    pub logging: LoggingConfig,
}

/// Model artifact location and pinning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// `.json` (canonical JSON) or `.bin` (bincode) artifact
    pub path: PathBuf,
    /// Hex blake3 hash the artifact must have
    pub expected_hash: Option<String>,
}

/// Historical dataset; aggregation is unavailable without one.
///
/// At most one of `path` (CSV export) and `sqlite` (database file) is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub path: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
    /// Table read from `sqlite`
    pub table: String,
}

/// Where the dataset is loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSource<'a> {
    Csv(&'a Path),
    Sqlite { path: &'a Path, table: &'a str },
}

/// Schema artifact; the built-in hotel schema when unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Fixed "today" for date-relative features; current date when unset
    pub reference_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("models/revenue_model.json"),
            expected_hash: None,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: None,
            sqlite: None,
            table: "hotel_data".to_string(),
        }
    }
}

impl DatasetConfig {
    /// The configured source, if any; both kinds at once is an error
    pub fn source(&self) -> Result<Option<DatasetSource<'_>>, ConfigurationError> {
        match (&self.path, &self.sqlite) {
            (Some(_), Some(_)) => Err(ConfigurationError::InvalidConfig(
                "dataset.path and dataset.sqlite are mutually exclusive".to_string(),
            )),
            (Some(path), None) => Ok(Some(DatasetSource::Csv(path))),
            (None, Some(path)) => Ok(Some(DatasetSource::Sqlite {
                path,
                table: &self.table,
            })),
            (None, None) => Ok(None),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RevenueConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::InvalidConfig(format!("failed to read config file: {e}"))
        })?;

        let config: RevenueConfig = toml::from_str(&content).map_err(|e| {
            ConfigurationError::InvalidConfig(format!("failed to parse config: {e}"))
        })?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigurationError> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ConfigurationError::InvalidConfig(format!("failed to serialize config: {e}"))
        })?;
        std::fs::write(path, content).map_err(|e| {
            ConfigurationError::InvalidConfig(format!("failed to write config file: {e}"))
        })
    }

    /// Apply `HOTEL_REVENUE_*` environment variables
    pub fn apply_env(&mut self) -> Vec<String> {
        self.apply_overrides(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Apply overrides from a `KEY → value` lookup (keys without the prefix).
    ///
    /// Returns a warning for each value that could not be parsed.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();

        if let Some(val) = lookup("MODEL_PATH") {
            self.model.path = PathBuf::from(val);
        }
        if let Some(val) = lookup("MODEL_HASH") {
            self.model.expected_hash = Some(val).filter(|v| !v.is_empty());
        }
        if let Some(val) = lookup("DATASET_PATH") {
            self.dataset.path = Some(PathBuf::from(val)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(val) = lookup("DATASET_SQLITE") {
            self.dataset.sqlite = Some(PathBuf::from(val)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(val) = lookup("DATASET_TABLE") {
            self.dataset.table = val;
        }
        if let Some(val) = lookup("SCHEMA_PATH") {
            self.schema.path = Some(PathBuf::from(val)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(val) = lookup("REFERENCE_DATE") {
            match NaiveDate::parse_from_str(&val, "%Y-%m-%d") {
                Ok(date) => self.encoding.reference_date = Some(date),
                Err(_) => warnings.push(format!(
                    "{ENV_PREFIX}REFERENCE_DATE `{val}` is not a YYYY-MM-DD date; ignored"
                )),
            }
        }
        if let Some(val) = lookup("LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Some(val) = lookup("LOG_JSON") {
            match val.parse() {
                Ok(json) => self.logging.json = json,
                Err(_) => warnings.push(format!(
                    "{ENV_PREFIX}LOG_JSON `{val}` is not true/false; ignored"
                )),
            }
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        warnings
    }

    /// Reject impossible settings; return warnings for questionable ones
    pub fn validate(&self) -> Result<Vec<String>, ConfigurationError> {
        let mut warnings = Vec::new();

        if self.model.path.as_os_str().is_empty() {
            return Err(ConfigurationError::InvalidConfig(
                "model.path must not be empty".to_string(),
            ));
        }

        if let Some(hash) = &self.model.expected_hash {
            if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(ConfigurationError::InvalidConfig(format!(
                    "model.expected_hash `{hash}` is not a 64-digit hex blake3 hash"
                )));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            warnings.push(format!(
                "logging.level `{}` is not one of {}; falling back to info",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        if self.dataset.source()?.is_none() {
            warnings.push("no dataset configured, aggregation is unavailable".to_string());
        }

        if self.model.expected_hash.is_none() {
            warnings.push("model hash is not pinned".to_string());
        }

        if warnings.is_empty() {
            info!("Configuration validation passed");
        } else {
            warn!("Configuration validation warnings: {:?}", warnings);
        }

        Ok(warnings)
    }
}
