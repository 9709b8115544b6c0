//! Data structures for the OPCOM day-ahead price pipeline
//!
//! [`HourlyPriceRecord`] and [`DailyDataset`] are the persisted shapes (parsed
//! artifact JSON). [`DailyStats`] and [`Snapshot`] are derived on every refresh
//! and never written to disk.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::transformations::{artifact_time, market_timestamp};

/// Market identifier reported to consumers
pub const REGION: &str = "RO";

/// Settlement currency of the day-ahead market
pub const CURRENCY: &str = "RON";

/// Energy unit reported to consumers
pub const UNIT: &str = "kWh";

/// Provenance label stored in every parsed artifact
pub const SOURCE_LABEL: &str = "Romanian Electricity Market CSV Export";

/// One cleared hour of the day-ahead market
///
/// Invariant: `hour == interval - 1` and `timestamp` is local midnight plus
/// `hour` hours, so it matches the local hour except on DST transition days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPriceRecord {
    /// 1-indexed delivery interval as published (1-24)
    pub interval: u32,

    /// 0-indexed hour of day (0-23)
    pub hour: u32,

    /// Closing price in lei/MWh (can be negative)
    pub price: f64,

    /// Traded volume in MWh (0 when the report omits it)
    pub volume: f64,

    /// Start of the hour in Europe/Bucharest local time
    /// Example: "2024-10-14T14:00:00+03:00"
    #[serde(rename = "datetime", with = "market_timestamp")]
    pub timestamp: DateTime<FixedOffset>,
}

/// How a dataset was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMethod {
    #[serde(rename = "CSV")]
    Csv,
}

/// Parsed artifact for one calendar date
///
/// Written whole by [`crate::cache::DailyCache::write_dataset`]; never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDataset {
    /// Delivery date (serialized as YYYY-MM-DD)
    pub date: NaiveDate,

    /// Hourly records sorted ascending by hour
    #[serde(rename = "hourly_data")]
    pub records: Vec<HourlyPriceRecord>,

    #[serde(with = "artifact_time")]
    pub downloaded_at: DateTime<Utc>,

    pub source: String,

    pub method: SourceMethod,

    /// Always `records.len()`
    pub total_hours: usize,
}

impl DailyDataset {
    /// Build a dataset, sorting records by hour
    pub fn new(
        date: NaiveDate,
        mut records: Vec<HourlyPriceRecord>,
        downloaded_at: DateTime<Utc>,
    ) -> Self {
        records.sort_by_key(|r| r.hour);
        let total_hours = records.len();
        Self {
            date,
            records,
            downloaded_at,
            source: SOURCE_LABEL.to_string(),
            method: SourceMethod::Csv,
            total_hours,
        }
    }

    /// Prices in hour order
    pub fn prices(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.price).collect()
    }

    /// Price of the record whose hour matches, if present
    pub fn price_at(&self, hour: u32) -> Option<f64> {
        self.records.iter().find(|r| r.hour == hour).map(|r| r.price)
    }
}

/// Aggregates over one day's prices
///
/// Band averages are 0 when the day has too few hours to cover the band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub average: f64,
    /// Hours 00-08
    pub off_peak_1: f64,
    /// Hours 20-24
    pub off_peak_2: f64,
    /// Hours 08-20
    pub peak: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Current price is below the daily average
    pub low_price: bool,
    /// Current price divided by the daily average (1.0 when average is not positive)
    pub price_percent_to_average: f64,
}

impl DailyStats {
    /// Stats for a day without prices
    pub fn empty() -> Self {
        Self {
            average: 0.0,
            off_peak_1: 0.0,
            off_peak_2: 0.0,
            peak: 0.0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            low_price: false,
            price_percent_to_average: 1.0,
        }
    }
}

/// One entry of the tomorrow forecast list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPrice {
    pub timestamp: DateTime<FixedOffset>,
    pub price: f64,
    pub hour: u32,
}

/// Price valid over a one-hour window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceWindow {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub value: f64,
}

/// Whether tomorrow's prices have been published yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Available,
    Pending,
}

impl DownloadStatus {
    /// Status label shown to consumers
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Available => "CSV Data Available",
            DownloadStatus::Pending => "Forecast Pending",
        }
    }
}

impl Serialize for DownloadStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Result of one refresh cycle, handed to callers
///
/// Rebuilt from the cache on every cycle. The datasets are kept for
/// in-process consumers and left out of the serialized form.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    #[serde(skip)]
    pub today_dataset: Option<DailyDataset>,

    #[serde(skip)]
    pub tomorrow_dataset: Option<DailyDataset>,

    pub current_price: f64,
    pub daily_average: f64,
    pub next_hour_price: f64,

    /// Today's prices in hour order
    pub today: Vec<f64>,

    /// Tomorrow's prices in hour order (empty until published)
    pub tomorrow: Vec<f64>,
    pub tomorrow_valid: bool,

    pub forecast_prices: Vec<ForecastPrice>,
    pub raw_today: Vec<PriceWindow>,
    pub raw_tomorrow: Vec<PriceWindow>,

    pub stats: DailyStats,
    pub download_status: DownloadStatus,
    pub last_updated: DateTime<FixedOffset>,
    pub progress: u8,

    pub region: &'static str,
    pub currency: &'static str,
    pub unit: &'static str,
    pub source: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformations::hour_start;

    fn record(hour: u32, price: f64) -> HourlyPriceRecord {
        let date = NaiveDate::from_ymd_opt(2024, 10, 14).unwrap();
        HourlyPriceRecord {
            interval: hour + 1,
            hour,
            price,
            volume: 0.0,
            timestamp: hour_start(date, hour),
        }
    }

    #[test]
    fn test_dataset_new_sorts_and_counts() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 14).unwrap();
        let ds = DailyDataset::new(
            date,
            vec![record(2, 30.0), record(0, 10.0), record(1, 20.0)],
            Utc::now(),
        );

        assert_eq!(ds.total_hours, 3);
        assert_eq!(ds.prices(), vec![10.0, 20.0, 30.0]);
        assert_eq!(ds.method, SourceMethod::Csv);
        assert_eq!(ds.source, SOURCE_LABEL);
    }

    #[test]
    fn test_price_at_missing_hour() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 14).unwrap();
        let ds = DailyDataset::new(date, vec![record(0, 10.0)], Utc::now());

        assert_eq!(ds.price_at(0), Some(10.0));
        assert_eq!(ds.price_at(5), None);
    }

    #[test]
    fn test_dataset_json_shape() {
        let date = NaiveDate::from_ymd_opt(2024, 10, 14).unwrap();
        let ds = DailyDataset::new(date, vec![record(14, 512.5)], Utc::now());
        let json = serde_json::to_value(&ds).unwrap();

        assert_eq!(json["date"], "2024-10-14");
        assert_eq!(json["method"], "CSV");
        assert_eq!(json["total_hours"], 1);
        assert_eq!(json["hourly_data"][0]["interval"], 15);
        assert_eq!(json["hourly_data"][0]["datetime"], "2024-10-14T14:00:00+03:00");
    }

    #[test]
    fn test_download_status_serializes_as_label() {
        let json = serde_json::to_string(&DownloadStatus::Pending).unwrap();
        assert_eq!(json, "\"Forecast Pending\"");
    }
}
