//! Retrieval of the daily CSV export
//!
//! [`Fetcher`] is the seam the orchestrator depends on; [`HttpFetcher`] is the
//! production implementation against the OPCOM export endpoint. The body is
//! decoded to UTF-8 here so everything downstream works on plain `String`s.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use encoding_rs::{Encoding, ISO_8859_2, WINDOWS_1250};
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONNECTION, REFERER, USER_AGENT,
};
use reqwest::StatusCode;
use tracing::debug;

use crate::config::TariffConfig;
use crate::error::FetchError;

/// Bodies at or below this many characters are not a report
pub const MIN_BODY_CHARS: usize = 100;

/// Upper bound on one export request, connect to last byte
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const REPORT_REFERER: &str = "https://www.opcom.ro/pp/DAM/DAM_PZU.php";

/// Source of raw report text for one delivery date
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> Result<String, FetchError>;
}

/// Export URL for `date`: `{base}/{DD}/{MM}/{YYYY}/{language}`
///
/// # Example
///
/// ```
/// # use chrono::NaiveDate;
/// # use opcom_dam_prices::fetcher::build_url;
/// let date = NaiveDate::from_ymd_opt(2024, 10, 5).unwrap();
/// assert_eq!(
///     build_url("https://www.opcom.ro/rapoarte-pzu-raportPIP-export-csv", date, "ro"),
///     "https://www.opcom.ro/rapoarte-pzu-raportPIP-export-csv/05/10/2024/ro"
/// );
/// ```
pub fn build_url(base_url: &str, date: NaiveDate, language: &str) -> String {
    format!(
        "{}/{}/{}",
        base_url.trim_end_matches('/'),
        date.format("%d/%m/%Y"),
        language
    )
}

/// Decode a response body: UTF-8 first, then ISO-8859-2, then Windows-1250
///
/// A leading UTF-8 byte order mark is dropped.
pub fn decode_body(bytes: &[u8]) -> Result<String, FetchError> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.trim_start_matches('\u{feff}').to_string());
    }

    let fallbacks: [&'static Encoding; 2] = [ISO_8859_2, WINDOWS_1250];
    fallbacks
        .iter()
        .find_map(|encoding| {
            encoding
                .decode_without_bom_handling_and_without_replacement(bytes)
                .map(|text| {
                    debug!(encoding = encoding.name(), "Decoded body with fallback encoding");
                    text.into_owned()
                })
        })
        .ok_or(FetchError::Undecodable)
}

/// Reject bodies too short to hold a report
pub fn ensure_report_length(text: String) -> Result<String, FetchError> {
    let chars = text.chars().count();
    if chars <= MIN_BODY_CHARS {
        return Err(FetchError::TooShort(chars));
    }
    Ok(text)
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/csv,application/csv,text/plain,*/*"),
    );
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("ro-RO,ro;q=0.9,en-US;q=0.8,en;q=0.7"),
    );
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(REFERER, HeaderValue::from_static(REPORT_REFERER));
    headers.insert(
        HeaderName::from_static("sec-fetch-dest"),
        HeaderValue::from_static("document"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-mode"),
        HeaderValue::from_static("navigate"),
    );
    headers.insert(
        HeaderName::from_static("sec-fetch-site"),
        HeaderValue::from_static("same-origin"),
    );
    headers
}

/// HTTP client for the OPCOM CSV export
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    language: String,
}

impl HttpFetcher {
    /// Build a client with the browser header set and request timeout
    pub fn new(base_url: impl Into<String>, language: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(browser_headers())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            language: language.into(),
        })
    }

    /// Build a client for the configured endpoint and language
    pub fn from_config(config: &TariffConfig) -> Result<Self, FetchError> {
        Self::new(config.base_url.clone(), config.language.clone())
    }

    /// Export URL this client requests for `date`
    pub fn url_for(&self, date: NaiveDate) -> String {
        build_url(&self.base_url, date, &self.language)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, date: NaiveDate) -> Result<String, FetchError> {
        let url = self.url_for(date);
        debug!(%url, "Requesting CSV export");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        ensure_report_length(decode_body(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_pads_and_trims_slash() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        assert_eq!(
            build_url("https://example.test/export/", date, "en"),
            "https://example.test/export/09/01/2025/en"
        );
    }

    #[test]
    fn test_decode_utf8_strips_bom() {
        let bytes = "\u{feff}Preț de Închidere".as_bytes();
        assert_eq!(decode_body(bytes).unwrap(), "Preț de Închidere");
    }

    #[test]
    fn test_decode_latin2_fallback() {
        // 0xE3 is 'ă' in ISO-8859-2 and not a valid standalone UTF-8 byte
        let bytes = b"Pia\xe3a pentru Ziua Urm\xe3toare";
        assert_eq!(decode_body(bytes).unwrap(), "Piaăa pentru Ziua Următoare");
    }

    #[test]
    fn test_short_body_rejected() {
        assert_eq!(
            ensure_report_length("x".repeat(100)),
            Err(FetchError::TooShort(100))
        );
        assert!(ensure_report_length("x".repeat(101)).is_ok());
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // 60 two-byte chars: 120 bytes but only 60 characters
        assert_eq!(
            ensure_report_length("ă".repeat(60)),
            Err(FetchError::TooShort(60))
        );
    }

    #[test]
    fn test_browser_headers_present() {
        let headers = browser_headers();
        assert_eq!(headers.get(REFERER).unwrap(), REPORT_REFERER);
        assert_eq!(headers.get("sec-fetch-mode").unwrap(), "navigate");
        assert!(headers
            .get(USER_AGENT)
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Chrome/120"));
    }

    #[test]
    fn test_client_builds_from_config() {
        let fetcher = HttpFetcher::from_config(&TariffConfig::default()).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 10, 14).unwrap();
        assert!(fetcher.url_for(date).ends_with("/14/10/2024/ro"));
    }
}
