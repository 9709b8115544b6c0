//! Pipeline configuration
//!
//! Deserializable from JSON (every field has a default) or built from
//! `OPCOM_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::RefreshError;

/// Default earliest date of interest
pub const DEFAULT_START_DATE: &str = "2023-12-14";
/// Default tick cadence (15 minutes)
pub const DEFAULT_DOWNLOAD_INTERVAL_SECS: u64 = 900;
/// Default artifact directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = "romania_dynamic_data";
/// OPCOM day-ahead CSV export endpoint
pub const DEFAULT_BASE_URL: &str = "https://www.opcom.ro/rapoarte-pzu-raportPIP-export-csv";
/// Report language segment
pub const DEFAULT_LANGUAGE: &str = "ro";

/// Settings for one orchestrator instance
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TariffConfig {
    /// Earliest date of interest; recorded but not used by the cycle
    pub start_date: NaiveDate,

    /// Seconds between scheduled refresh cycles
    pub download_interval: u64,

    /// Directory holding raw and parsed artifacts
    pub data_dir: PathBuf,

    /// CSV export endpoint, without the date segments
    pub base_url: String,

    /// Report language segment of the export URL
    pub language: String,
}

impl Default for TariffConfig {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2023, 12, 14).unwrap_or_default(),
            download_interval: DEFAULT_DOWNLOAD_INTERVAL_SECS,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            base_url: DEFAULT_BASE_URL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl TariffConfig {
    /// Build from `OPCOM_*` environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, RefreshError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    ///
    /// Recognized keys: `OPCOM_START_DATE` (YYYY-MM-DD), `OPCOM_DOWNLOAD_INTERVAL`
    /// (seconds), `OPCOM_DATA_DIR`, `OPCOM_BASE_URL`, `OPCOM_LANGUAGE`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RefreshError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("OPCOM_START_DATE") {
            config.start_date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
                RefreshError::Config(format!(
                    "OPCOM_START_DATE must be YYYY-MM-DD, got '{}'",
                    value
                ))
            })?;
        }

        if let Some(value) = lookup("OPCOM_DOWNLOAD_INTERVAL") {
            config.download_interval = value.trim().parse().map_err(|_| {
                RefreshError::Config(format!(
                    "OPCOM_DOWNLOAD_INTERVAL must be a number of seconds, got '{}'",
                    value
                ))
            })?;
        }

        if let Some(value) = lookup("OPCOM_DATA_DIR") {
            config.data_dir = PathBuf::from(value);
        }

        if let Some(value) = lookup("OPCOM_BASE_URL") {
            config.base_url = value;
        }

        if let Some(value) = lookup("OPCOM_LANGUAGE") {
            config.language = value;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject a zero interval, a non-HTTP base URL or an empty language
    pub fn validate(&self) -> Result<(), RefreshError> {
        if self.download_interval == 0 {
            return Err(RefreshError::Config(
                "download_interval must be greater than 0".to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(RefreshError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }

        if self.language.trim().is_empty() {
            return Err(RefreshError::Config("language must not be empty".to_string()));
        }

        Ok(())
    }

    /// Tick cadence of the scheduling loop
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.download_interval)
    }
}
