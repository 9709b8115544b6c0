//! Error types for the OPCOM price pipeline
//!
//! Every component boundary returns one of these:
//! - Network retrieval errors (transport, HTTP status, body validation)
//! - CSV parsing errors (missing section, no data, row-level number errors)
//! - Cache errors (artifact read/write, corrupt JSON)
//!
//! The orchestrator downgrades component errors to warnings per sub-step;
//! only [`RefreshError`] ever reaches a caller.

use std::fmt;

/// Top-level error type for a refresh cycle
///
/// Supports automatic conversion from component error types via From trait
#[derive(Debug, Clone)]
pub enum RefreshError {
    /// Network retrieval error
    Fetch(FetchError),

    /// CSV parsing error
    Parse(ParseError),

    /// Cache read/write error
    Cache(CacheError),

    /// Invalid configuration value
    Config(String),

    /// A refresh was coalesced into an in-flight cycle that produced nothing
    NoSnapshot,

    /// Unexpected failure with message
    Unexpected(String),
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshError::Fetch(e) => write!(f, "Fetch error: {}", e),
            RefreshError::Parse(e) => write!(f, "Parse error: {}", e),
            RefreshError::Cache(e) => write!(f, "Cache error: {}", e),
            RefreshError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RefreshError::NoSnapshot => {
                write!(f, "Refresh already in flight and no snapshot is available yet")
            }
            RefreshError::Unexpected(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<FetchError> for RefreshError {
    fn from(err: FetchError) -> Self {
        RefreshError::Fetch(err)
    }
}

impl From<ParseError> for RefreshError {
    fn from(err: ParseError) -> Self {
        RefreshError::Parse(err)
    }
}

impl From<CacheError> for RefreshError {
    fn from(err: CacheError) -> Self {
        RefreshError::Cache(err)
    }
}

impl From<String> for RefreshError {
    fn from(msg: String) -> Self {
        RefreshError::Unexpected(msg)
    }
}

impl From<&str> for RefreshError {
    fn from(msg: &str) -> Self {
        RefreshError::Unexpected(msg.to_string())
    }
}

/// Network retrieval errors
///
/// Occurs while downloading one day's CSV export
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Network-level failure (timeout, DNS, connection reset)
    Transport(String),

    /// Any HTTP status other than 200
    ///
    /// The publisher answers 404 or an empty page for days not yet cleared
    BadStatus(u16),

    /// Decoded body is too short to contain a report (length in chars)
    TooShort(usize),

    /// None of the candidate encodings (UTF-8, ISO-8859-2, Windows-1250) decoded the body
    Undecodable,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "Transport error: {}", msg),
            FetchError::BadStatus(status) => write!(f, "Unexpected HTTP status {}", status),
            FetchError::TooShort(len) => {
                write!(f, "Response too short: {} characters (expected > 100)", len)
            }
            FetchError::Undecodable => {
                write!(f, "Response is not valid UTF-8, ISO-8859-2 or Windows-1250 text")
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// CSV parsing errors
///
/// `SectionNotFound`, `NoData` and `Incomplete` describe the whole report;
/// the remaining variants describe a single row and are logged, not returned.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// No header line with both "Interval" and "Pret de Inchidere"
    SectionNotFound,

    /// Neither hourly rows nor a daily-average marker row could be parsed
    NoData,

    /// Fewer than 20 hourly records parsed (count). Non-fatal.
    Incomplete(usize),

    /// Price or volume cell is not a number after normalization
    ///
    /// Example: "443,7a"
    InvalidDecimal(String),

    /// Interval cell is not an integer in 1..=24
    InvalidInterval(String),

    /// Traded volume is negative
    NegativeVolume(String),

    /// A stored timestamp could not be parsed
    InvalidTimestamp(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::SectionNotFound => {
                write!(f, "Hourly section header not found in CSV")
            }
            ParseError::NoData => write!(f, "No hourly or daily-average data in CSV"),
            ParseError::Incomplete(count) => {
                write!(f, "Only {} hours parsed, expected ~24", count)
            }
            ParseError::InvalidDecimal(val) => {
                write!(
                    f,
                    "Invalid decimal format: '{}' (expected comma or period decimal separator)",
                    val
                )
            }
            ParseError::InvalidInterval(val) => {
                write!(f, "Invalid interval: '{}' (expected integer 1-24)", val)
            }
            ParseError::NegativeVolume(val) => {
                write!(f, "Negative traded volume not allowed: '{}'", val)
            }
            ParseError::InvalidTimestamp(val) => {
                write!(f, "Invalid timestamp: '{}'", val)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Cache errors
///
/// Paths are kept as display strings so the error stays `Clone`
#[derive(Debug, Clone, PartialEq)]
pub enum CacheError {
    /// Filesystem operation failed
    Io { path: String, message: String },

    /// Dataset could not be serialized to JSON
    Serialization(String),

    /// Parsed artifact exists but is not a valid dataset
    Corrupt { path: String, message: String },
}

impl CacheError {
    pub(crate) fn io(path: &std::path::Path, err: std::io::Error) -> Self {
        CacheError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io { path, message } => write!(f, "I/O error on {}: {}", path, message),
            CacheError::Serialization(msg) => write!(f, "Failed to serialize dataset: {}", msg),
            CacheError::Corrupt { path, message } => {
                write!(f, "Corrupt artifact {}: {}", path, message)
            }
        }
    }
}

impl std::error::Error for CacheError {}
