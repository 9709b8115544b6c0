//! OPCOM DAM prices - Romanian day-ahead electricity price pipeline
//!
//! Periodically downloads the OPCOM day-ahead market (PZU) CSV export, parses
//! it into hourly prices, caches raw and parsed artifacts per delivery date,
//! and derives the tariff statistics handed to callers as a [`Snapshot`].
//!
//! # Features
//! - Tolerant CSV parsing (comma/semicolon/tab rows, Romanian decimals,
//!   daily-average fallback)
//! - Europe/Bucharest hour timestamps, DST-aware
//! - Per-date raw + parsed cache with whole-file replacement
//! - Off-peak / peak band statistics
//! - Non-overlapping refresh cycles on a fixed cadence
//!
//! # Usage
//!
//! ```no_run
//! use opcom_dam_prices::{RefreshOrchestrator, TariffConfig};
//!
//! # async fn demo() -> Result<(), opcom_dam_prices::RefreshError> {
//! let orchestrator = RefreshOrchestrator::with_http(TariffConfig::from_env()?)?;
//! let snapshot = orchestrator.refresh_now().await?;
//! println!("{} {}/MWh", snapshot.current_price, snapshot.currency);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod csv_parser;
pub mod csv_utils;
mod error;
pub mod fetcher;
pub mod logging;
pub mod orchestrator;
pub mod stats;
pub mod transformations;
mod types;

// Re-export public types for easier access
pub use cache::DailyCache;
pub use config::TariffConfig;
pub use error::{CacheError, FetchError, ParseError, RefreshError};
pub use fetcher::{Fetcher, HttpFetcher};
pub use orchestrator::RefreshOrchestrator;
pub use types::{
    DailyDataset, DailyStats, DownloadStatus, ForecastPrice, HourlyPriceRecord, PriceWindow,
    Snapshot, SourceMethod, CURRENCY, REGION, SOURCE_LABEL, UNIT,
};
