//! On-disk cache of daily artifacts
//!
//! Two files per delivery date, named by ISO date under one root directory:
//! - `YYYY-MM-DD.csv`: raw report text as fetched (stored as UTF-8)
//! - `YYYY-MM-DD.json`: parsed [`DailyDataset`]
//!
//! Keeping the raw text lets a newer parser reprocess a day without another
//! download. A raw file newer than its parsed file marks the day stale.
//!
//! Every write goes to a temporary sibling, is synced and read back, then
//! renamed over the target, so a file never holds a mix of two fetches.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::debug;

use crate::error::CacheError;
use crate::types::{DailyDataset, HourlyPriceRecord};

/// Directory-backed store of raw and parsed artifacts
#[derive(Debug, Clone)]
pub struct DailyCache {
    root: PathBuf,
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from)
}

fn read_optional(path: &Path) -> Result<Option<String>, CacheError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

/// Replace `path` with `contents` via a verified temporary file
fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let mut file = fs::File::create(&tmp_path).map_err(|e| CacheError::io(&tmp_path, e))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| CacheError::io(&tmp_path, e))?;
    drop(file);

    let written = fs::read(&tmp_path).map_err(|e| CacheError::io(&tmp_path, e))?;
    if written != contents {
        let _ = fs::remove_file(&tmp_path);
        return Err(CacheError::Io {
            path: tmp_path.display().to_string(),
            message: "read-back does not match written contents".to_string(),
        });
    }

    fs::rename(&tmp_path, path).map_err(|e| CacheError::io(path, e))
}

impl DailyCache {
    /// Open a cache rooted at `root`, creating the directory if needed
    pub fn new(root: impl AsRef<Path>) -> Result<Self, CacheError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).map_err(|e| CacheError::io(&root, e))?;
        Ok(Self { root })
    }

    /// Directory holding every artifact
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the parsed JSON artifact for `date`
    pub fn parsed_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("{}.json", date.format("%Y-%m-%d")))
    }

    /// Path of the raw CSV artifact for `date`
    pub fn raw_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// A parsed artifact exists for `date`
    pub fn has(&self, date: NaiveDate) -> bool {
        self.parsed_path(date).is_file()
    }

    /// A raw artifact exists for `date`
    pub fn has_raw(&self, date: NaiveDate) -> bool {
        self.raw_path(date).is_file()
    }

    /// Load the parsed dataset for `date`
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - Nothing cached for this date
    /// * `Ok(Some(DailyDataset))` - Cached dataset
    /// * `Err(CacheError::Corrupt)` - File exists but is not a valid dataset
    pub fn read_dataset(&self, date: NaiveDate) -> Result<Option<DailyDataset>, CacheError> {
        let path = self.parsed_path(date);
        let Some(json) = read_optional(&path)? else {
            return Ok(None);
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                path: path.display().to_string(),
                message: e.to_string(),
            })
    }

    /// Overwrite the parsed dataset for `date`
    ///
    /// Returns the dataset as written, with `downloaded_at` set to now.
    pub fn write_dataset(
        &self,
        date: NaiveDate,
        records: Vec<HourlyPriceRecord>,
    ) -> Result<DailyDataset, CacheError> {
        let dataset = DailyDataset::new(date, records, Utc::now());
        let json = serde_json::to_string_pretty(&dataset)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let path = self.parsed_path(date);
        write_atomic(&path, json.as_bytes())?;
        debug!(path = %path.display(), hours = dataset.total_hours, "Wrote parsed artifact");

        Ok(dataset)
    }

    /// Load the raw report text for `date`
    pub fn read_raw(&self, date: NaiveDate) -> Result<Option<String>, CacheError> {
        read_optional(&self.raw_path(date))
    }

    /// Overwrite the raw report text for `date`
    pub fn write_raw(&self, date: NaiveDate, text: &str) -> Result<(), CacheError> {
        let path = self.raw_path(date);
        write_atomic(&path, text.as_bytes())?;
        debug!(path = %path.display(), chars = text.chars().count(), "Saved raw report");
        Ok(())
    }

    /// The parsed artifact needs rebuilding
    ///
    /// True when the raw artifact exists and is newer than the parsed one (or
    /// the parsed one is missing). With `threshold_hours`, a parsed artifact
    /// older than the threshold also counts as stale.
    pub fn is_stale(&self, date: NaiveDate, threshold_hours: Option<f64>) -> bool {
        let raw_modified = modified_at(&self.raw_path(date));
        let parsed_modified = modified_at(&self.parsed_path(date));

        let raw_is_newer = match (raw_modified, parsed_modified) {
            (Some(raw), Some(parsed)) => raw > parsed,
            (Some(_), None) => true,
            (None, _) => false,
        };

        let too_old = match (threshold_hours, self.age_hours(date)) {
            (Some(threshold), Some(age)) => age > threshold,
            _ => false,
        };

        raw_is_newer || too_old
    }

    /// Hours since the parsed artifact was written
    pub fn age_hours(&self, date: NaiveDate) -> Option<f64> {
        self.age_hours_at(date, Utc::now())
    }

    /// Hours between the parsed artifact's write time and `now`
    pub fn age_hours_at(&self, date: NaiveDate, now: DateTime<Utc>) -> Option<f64> {
        modified_at(&self.parsed_path(date))
            .map(|written| (now - written).num_milliseconds() as f64 / 3_600_000.0)
    }
}
