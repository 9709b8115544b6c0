//! CSV parser for OPCOM day-ahead (PZU) report exports
//!
//! Turns one day's raw report text into hourly price records. Pure: no I/O.
//!
//! # Report Format
//!
//! - **Title lines:** free text before the tables (ignored)
//! - **Hourly header:** a line containing `Interval` and `Pret de Inchidere`
//! - **Data rows:** first cell is the market identifier (`Romania`), then
//!   interval (1-24), closing price (lei/MWh) and traded volume (MWh)
//! - **Decimal separator:** comma or period, spaces as thousands separator
//! - **Daily index:** `"ROPEX_DAM_Base","<price>","1-24"` row, used only when no
//!   hourly rows could be read
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use opcom_dam_prices::csv_parser::parse_daily_csv;
//!
//! let csv = r#""Zona de tranzactionare","Interval","Pret de Inchidere [Lei/MWh]","Volum Tranzactionat [MWh]"
//! "Romania","2","401,10","980,5"
//! "Romania","1","443,76","1145,0""#;
//!
//! let date = NaiveDate::from_ymd_opt(2024, 10, 14).unwrap();
//! let day = parse_daily_csv(csv, date).unwrap();
//! assert_eq!(day.records.len(), 2);
//! assert_eq!(day.records[0].hour, 0);
//! assert_eq!(day.records[0].price, 443.76);
//! assert!(day.incomplete);
//! ```

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::csv_utils::{split_row, RowSplit};
use crate::error::ParseError;
use crate::transformations::*;
use crate::types::HourlyPriceRecord;

/// Labels that together identify the hourly section header (case-sensitive)
pub const HOURLY_SECTION_MARKERS: [&str; 2] = ["Interval", "Pret de Inchidere"];

/// First-cell label of an hourly data row (compared case-insensitively)
pub const MARKET_IDENTIFIER: &str = "Romania";

/// Base-load index product code of the daily-average row
pub const DAILY_AVERAGE_PRODUCT: &str = "ROPEX_DAM_Base";

/// Range marker of the daily-average row
pub const FULL_DAY_RANGE: &str = "1-24";

/// Below this many hours a day is flagged incomplete
pub const COMPLETE_DAY_HOURS: usize = 20;

/// Parser output for one delivery day
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDay {
    /// Records sorted ascending by hour
    pub records: Vec<HourlyPriceRecord>,

    /// Fewer than [`COMPLETE_DAY_HOURS`] records were found
    pub incomplete: bool,

    /// Records were synthesized from the daily-average row
    pub from_daily_average: bool,
}

impl ParsedDay {
    /// Non-fatal warning for the caller to log
    pub fn warning(&self) -> Option<ParseError> {
        self.incomplete
            .then(|| ParseError::Incomplete(self.records.len()))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Find the first data line of the hourly section
///
/// # Returns
///
/// * `Ok(usize)` - Index of the line after the hourly header
/// * `Err(ParseError::SectionNotFound)` - No line carries both header labels
pub fn locate_hourly_section(lines: &[&str]) -> Result<usize, ParseError> {
    lines
        .iter()
        .position(|line| HOURLY_SECTION_MARKERS.iter().all(|m| line.contains(m)))
        .map(|idx| idx + 1)
        .ok_or(ParseError::SectionNotFound)
}

/// Parse one split row
///
/// Returns `Ok(None)` when the row is not a market data row (sub-headers,
/// other zones, totals).
fn parse_hourly_row(
    cells: &[String],
    target_date: NaiveDate,
) -> Result<Option<HourlyPriceRecord>, ParseError> {
    let is_market_row = cells
        .first()
        .is_some_and(|c| c.eq_ignore_ascii_case(MARKET_IDENTIFIER));
    if !is_market_row {
        return Ok(None);
    }

    let interval = parse_interval(&cells[1])?;
    let price = parse_romanian_decimal(&cells[2])?;
    let volume = cells.get(3).map_or(Ok(0.0), |v| parse_volume(v))?;
    let hour = interval_to_hour(interval);

    Ok(Some(HourlyPriceRecord {
        interval,
        hour,
        price,
        volume,
        timestamp: hour_start(target_date, hour),
    }))
}

/// Parse every market row after the hourly header
///
/// Rows failing numeric parsing are logged and skipped.
pub fn parse_hourly_rows(
    lines: &[&str],
    section_start: usize,
    target_date: NaiveDate,
) -> Vec<HourlyPriceRecord> {
    let mut records = Vec::new();

    for (offset, line) in lines.iter().enumerate().skip(section_start) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let cells = match split_row(line) {
            RowSplit::Cells { cells, .. } => cells,
            RowSplit::Unstructured => continue,
        };

        match parse_hourly_row(&cells, target_date) {
            Ok(Some(record)) => {
                debug!(
                    hour = record.hour,
                    price = record.price,
                    volume = record.volume,
                    "Parsed hourly row"
                );
                records.push(record);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(line = offset + 1, error = %e, "Skipping malformed hourly row");
            }
        }
    }

    records
}

/// Find the daily base-load average price
///
/// Uses the first marker row whose price cell parses.
pub fn find_daily_average(lines: &[&str]) -> Option<f64> {
    for line in lines {
        if !(line.contains(DAILY_AVERAGE_PRODUCT) && line.contains(FULL_DAY_RANGE)) {
            continue;
        }

        let Some(price_cell) = split_row(line.trim())
            .cells()
            .and_then(|cells| cells.get(1).cloned())
        else {
            continue;
        };

        match parse_romanian_decimal(&price_cell) {
            Ok(price) => return Some(price),
            Err(e) => warn!(error = %e, "Error parsing daily average price"),
        }
    }

    None
}

/// Build 24 hourly records carrying the same price and zero volume
pub fn synthesize_uniform_day(target_date: NaiveDate, price: f64) -> Vec<HourlyPriceRecord> {
    (0..24)
        .map(|hour| HourlyPriceRecord {
            interval: hour + 1,
            hour,
            price,
            volume: 0.0,
            timestamp: hour_start(target_date, hour),
        })
        .collect()
}

// ============================================================================
// Main Parsing Function
// ============================================================================

/// Parse one day's report into hourly records
///
/// # Arguments
///
/// * `raw_text` - Decoded report text
/// * `target_date` - Delivery date the report belongs to
///
/// # Returns
///
/// * `Ok(ParsedDay)` - Records sorted by hour, possibly flagged incomplete
/// * `Err(ParseError::NoData)` - Neither hourly rows nor a usable daily average
///
/// Duplicate hours are kept as published; callers consume the sorted list.
pub fn parse_daily_csv(raw_text: &str, target_date: NaiveDate) -> Result<ParsedDay, ParseError> {
    let lines: Vec<&str> = raw_text.trim().split('\n').collect();
    debug!(lines = lines.len(), %target_date, "Parsing report");

    let mut records = match locate_hourly_section(&lines) {
        Ok(start) => parse_hourly_rows(&lines, start, target_date),
        Err(e) => {
            warn!(%target_date, error = %e, "Trying daily average fallback");
            Vec::new()
        }
    };

    let mut from_daily_average = false;
    if records.is_empty() {
        match find_daily_average(&lines) {
            Some(avg) if avg > 0.0 => {
                info!(%target_date, price = avg, "Using daily average price for all hours");
                records = synthesize_uniform_day(target_date, avg);
                from_daily_average = true;
            }
            _ => return Err(ParseError::NoData),
        }
    }

    records.sort_by_key(|r| r.hour);
    let incomplete = records.len() < COMPLETE_DAY_HOURS;

    Ok(ParsedDay {
        records,
        incomplete,
        from_daily_average,
    })
}

// ============================================================================
// TESTS
// ============================================================================
