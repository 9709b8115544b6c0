//! Value transformations for OPCOM CSV data
//!
//! Converts Romanian-formatted report cells into typed values and builds
//! market-local timestamps.
//!
//! # Transformations
//!
//! 1. **Romanian decimal conversion**: `"1 145,50"` → `1145.5`
//! 2. **Volume parsing**: empty → `0.0`, negative rejected
//! 3. **Interval mapping**: `"15"` → interval 15, hour 14
//! 4. **Local hour timestamps**: `(2024-10-14, 14)` → `2024-10-14T14:00:00+03:00`
//! 5. **Artifact timestamp (de)serialization** for the parsed JSON cache
//!
//! # Example
//!
//! ```rust
//! use opcom_dam_prices::transformations::*;
//!
//! assert_eq!(parse_romanian_decimal("443,76").unwrap(), 443.76);
//! assert_eq!(parse_volume("").unwrap(), 0.0);
//! assert_eq!(interval_to_hour(parse_interval("1").unwrap()), 0);
//! ```

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ParseError;

/// Timezone the market publishes delivery hours in
pub const MARKET_TZ: Tz = chrono_tz::Europe::Bucharest;

/// Current wall-clock time in the market timezone
pub fn market_now() -> DateTime<Tz> {
    Utc::now().with_timezone(&MARKET_TZ)
}

// ============================================================================
// Transformation 1: Romanian Decimal Conversion
// ============================================================================

/// Parse a Romanian-formatted decimal
///
/// Comma is accepted as the decimal separator and spaces (including
/// non-breaking spaces) as thousands separators.
///
/// # Examples
///
/// ```
/// # use opcom_dam_prices::transformations::parse_romanian_decimal;
/// assert_eq!(parse_romanian_decimal("443,76").unwrap(), 443.76);
/// assert_eq!(parse_romanian_decimal("1 145,5").unwrap(), 1145.5);
/// assert_eq!(parse_romanian_decimal("-12.5").unwrap(), -12.5);
/// assert!(parse_romanian_decimal("").is_err());
/// assert!(parse_romanian_decimal("n/a").is_err());
/// ```
pub fn parse_romanian_decimal(value: &str) -> Result<f64, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ParseError::InvalidDecimal(value.to_string()));
    }

    let normalized: String = trimmed
        .chars()
        .filter(|c| *c != ' ' && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    normalized
        .parse::<f64>()
        .map_err(|_| ParseError::InvalidDecimal(value.to_string()))
}

// ============================================================================
// Transformation 2: Volume Parsing
// ============================================================================

/// Parse a traded-volume cell
///
/// Empty cells mean the report omitted the volume and yield `0.0`.
/// Traded volume cannot be negative.
///
/// # Examples
///
/// ```
/// # use opcom_dam_prices::transformations::parse_volume;
/// assert_eq!(parse_volume("1145,0").unwrap(), 1145.0);
/// assert_eq!(parse_volume("  ").unwrap(), 0.0);
/// assert!(parse_volume("-3,0").is_err());
/// ```
pub fn parse_volume(value: &str) -> Result<f64, ParseError> {
    if value.trim().is_empty() {
        return Ok(0.0);
    }

    let parsed = parse_romanian_decimal(value)?;
    if parsed < 0.0 {
        return Err(ParseError::NegativeVolume(value.to_string()));
    }

    Ok(parsed)
}

// ============================================================================
// Transformation 3: Interval Mapping
// ============================================================================

/// Parse a 1-indexed delivery interval (1..=24)
pub fn parse_interval(value: &str) -> Result<u32, ParseError> {
    value
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|i| (1..=24).contains(i))
        .ok_or_else(|| ParseError::InvalidInterval(value.to_string()))
}

/// Convert a 1-indexed interval into a 0-indexed hour
pub fn interval_to_hour(interval: u32) -> u32 {
    interval.saturating_sub(1)
}

// ============================================================================
// Transformation 4: Local Hour Timestamps
// ============================================================================

/// Start of `hour` on `date` in market-local time
///
/// Local midnight plus `hour` elapsed hours, so consecutive hours are always
/// one hour apart. The local hour equals `hour` except after a DST transition:
/// on the 23-hour spring-forward day hour 3 starts at 04:00, and on the 25-hour
/// fall-back day hour 4 starts at the repeated 03:00.
///
/// # Examples
///
/// ```
/// # use chrono::NaiveDate;
/// # use opcom_dam_prices::transformations::hour_start;
/// let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
/// assert_eq!(hour_start(date, 8).to_rfc3339(), "2024-01-15T08:00:00+02:00");
///
/// let summer = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
/// assert_eq!(hour_start(summer, 8).to_rfc3339(), "2024-07-15T08:00:00+03:00");
/// ```
pub fn hour_start(date: NaiveDate, hour: u32) -> DateTime<FixedOffset> {
    let midnight = date.and_time(NaiveTime::MIN);
    let start = MARKET_TZ
        .from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| MARKET_TZ.from_utc_datetime(&midnight));

    (start + Duration::hours(i64::from(hour))).fixed_offset()
}

/// Interpret a naive timestamp as market-local time
fn localize(naive: NaiveDateTime) -> DateTime<FixedOffset> {
    MARKET_TZ
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| MARKET_TZ.from_utc_datetime(&naive))
        .fixed_offset()
}

/// Parse a stored hour timestamp
///
/// Accepts RFC 3339 with offset, or the naive `YYYY-MM-DD HH:MM:SS` form
/// written by older cache files (interpreted in market-local time).
pub fn parse_market_timestamp(value: &str) -> Result<DateTime<FixedOffset>, ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }

    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .map(localize)
        .map_err(|_| ParseError::InvalidTimestamp(value.to_string()))
}

// ============================================================================
// Transformation 5: Artifact Timestamp (De)serialization
// ============================================================================

/// Serde adapter for hour timestamps in the parsed artifact
pub mod market_timestamp {
    use chrono::{DateTime, FixedOffset};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Write as RFC 3339 with offset
    pub fn serialize<S: Serializer>(
        ts: &DateTime<FixedOffset>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    /// Read RFC 3339 or a legacy naive local timestamp
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<FixedOffset>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_market_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `downloaded_at`
///
/// Older artifacts carry a naive local ISO timestamp with fractional seconds.
pub mod artifact_time {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Write as RFC 3339 in UTC
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339())
    }

    /// Read RFC 3339 or a legacy naive local timestamp
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;

        if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(dt.with_timezone(&Utc));
        }

        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| super::localize(naive).with_timezone(&Utc))
            .map_err(|_| serde::de::Error::custom(format!("invalid downloaded_at: {}", raw)))
    }
}
