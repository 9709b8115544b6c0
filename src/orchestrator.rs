//! Refresh cycle and scheduling loop
//!
//! One cycle walks a fixed sequence of steps:
//!
//! 1. **Check today** - reprocess the raw artifact if it is newer than the
//!    parsed one or the parsed one is unreadable, otherwise fetch if nothing
//!    readable is cached
//! 2. **Check tomorrow** - same staleness check for tomorrow's date
//! 3. **Decide tomorrow fetch** - fetch if tomorrow is absent or unreadable,
//!    or if it is older than two hours and the local time is past noon
//! 4. **Build snapshot** - read both datasets from the cache and derive prices
//!    and stats
//!
//! Fetch, parse and cache read failures are logged and treated as "not
//! available yet", so a bad artifact for one date never hides the other.
//!
//! Cycles never overlap. A caller that triggers a refresh while one is in
//! flight waits for it and gets that cycle's outcome.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::cache::DailyCache;
use crate::config::TariffConfig;
use crate::csv_parser::{parse_daily_csv, ParsedDay};
use crate::error::RefreshError;
use crate::fetcher::{Fetcher, HttpFetcher};
use crate::stats;
use crate::transformations::market_now;
use crate::types::{
    DailyDataset, DownloadStatus, ForecastPrice, PriceWindow, Snapshot, CURRENCY, REGION,
    SOURCE_LABEL, UNIT,
};

/// Tomorrow's artifact is re-fetched once it is older than this
pub const TOMORROW_REFETCH_AGE_HOURS: f64 = 2.0;

/// Local hour from which tomorrow's prices may have been published
pub const TOMORROW_PUBLICATION_HOUR: u32 = 12;

/// Decide whether tomorrow's report should be fetched
///
/// # Arguments
///
/// * `age_hours` - Age of tomorrow's parsed artifact, `None` if absent
/// * `local_hour` - Current hour in market-local time
///
/// # Example
///
/// ```
/// # use opcom_dam_prices::orchestrator::should_fetch_tomorrow;
/// assert!(should_fetch_tomorrow(None, 3));
/// assert!(should_fetch_tomorrow(Some(3.0), 14));
/// assert!(!should_fetch_tomorrow(Some(1.0), 14));
/// assert!(!should_fetch_tomorrow(Some(3.0), 9));
/// ```
pub fn should_fetch_tomorrow(age_hours: Option<f64>, local_hour: u32) -> bool {
    match age_hours {
        None => true,
        Some(age) => age > TOMORROW_REFETCH_AGE_HOURS && local_hour >= TOMORROW_PUBLICATION_HOUR,
    }
}

/// Assemble the caller-facing snapshot from cached datasets
///
/// Pure: reads nothing but its arguments.
pub fn build_snapshot(
    now: DateTime<Tz>,
    today: Option<DailyDataset>,
    tomorrow: Option<DailyDataset>,
) -> Snapshot {
    let hour = now.hour();

    let today_prices = today.as_ref().map(DailyDataset::prices).unwrap_or_default();
    let tomorrow_prices = tomorrow.as_ref().map(DailyDataset::prices).unwrap_or_default();

    let current_price = today
        .as_ref()
        .and_then(|ds| ds.price_at(hour))
        .unwrap_or(0.0);

    let next_hour_price = today
        .as_ref()
        .and_then(|ds| ds.price_at(hour + 1))
        .or_else(|| tomorrow_prices.first().copied())
        .unwrap_or(0.0);

    let stats = stats::compute(&today_prices, current_price);

    let windows = |ds: &Option<DailyDataset>| -> Vec<PriceWindow> {
        ds.iter()
            .flat_map(|d| d.records.iter())
            .map(|r| PriceWindow {
                start: r.timestamp,
                end: r.timestamp + Duration::hours(1),
                value: r.price,
            })
            .collect()
    };

    let forecast_prices = tomorrow
        .iter()
        .flat_map(|d| d.records.iter())
        .map(|r| ForecastPrice {
            timestamp: r.timestamp,
            price: r.price,
            hour: r.hour,
        })
        .collect();

    let tomorrow_valid = !tomorrow_prices.is_empty();

    Snapshot {
        current_price,
        daily_average: stats.average,
        next_hour_price,
        raw_today: windows(&today),
        raw_tomorrow: windows(&tomorrow),
        today: today_prices,
        tomorrow: tomorrow_prices,
        tomorrow_valid,
        forecast_prices,
        stats,
        download_status: if tomorrow_valid {
            DownloadStatus::Available
        } else {
            DownloadStatus::Pending
        },
        last_updated: now.fixed_offset(),
        progress: 100,
        region: REGION,
        currency: CURRENCY,
        unit: UNIT,
        source: SOURCE_LABEL,
        today_dataset: today,
        tomorrow_dataset: tomorrow,
    }
}

#[derive(Debug, Default)]
struct CycleState {
    last_snapshot: Option<Snapshot>,
    last_error: Option<RefreshError>,
}

impl CycleState {
    /// Outcome of the most recent cycle, for callers that waited on it
    fn settled(&self) -> Result<Snapshot, RefreshError> {
        if let Some(e) = &self.last_error {
            return Err(e.clone());
        }
        self.last_snapshot.clone().ok_or(RefreshError::NoSnapshot)
    }
}

/// Owns the cache directory and drives refresh cycles
pub struct RefreshOrchestrator {
    config: TariffConfig,
    cache: DailyCache,
    fetcher: Arc<dyn Fetcher>,
    cycle_lock: Mutex<()>,
    state: RwLock<CycleState>,
}

impl RefreshOrchestrator {
    /// Create an orchestrator over `config.data_dir` using `fetcher`
    pub fn new(config: TariffConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, RefreshError> {
        config.validate()?;
        let cache = DailyCache::new(&config.data_dir)?;

        info!(
            data_dir = %config.data_dir.display(),
            start_date = %config.start_date,
            interval_secs = config.download_interval,
            "Initialized refresh orchestrator"
        );

        Ok(Self {
            config,
            cache,
            fetcher,
            cycle_lock: Mutex::new(()),
            state: RwLock::new(CycleState::default()),
        })
    }

    /// Create an orchestrator backed by the OPCOM HTTP export
    pub fn with_http(config: TariffConfig) -> Result<Self, RefreshError> {
        let fetcher = HttpFetcher::from_config(&config)?;
        Self::new(config, Arc::new(fetcher))
    }

    /// Configuration this orchestrator was built with
    pub fn config(&self) -> &TariffConfig {
        &self.config
    }

    /// Artifact cache owned by this orchestrator
    pub fn cache(&self) -> &DailyCache {
        &self.cache
    }

    /// Snapshot of the last successful cycle
    pub fn get_last_snapshot(&self) -> Option<Snapshot> {
        self.state.read().last_snapshot.clone()
    }

    /// Message of the last failed cycle, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.state.read().last_error.as_ref().map(ToString::to_string)
    }

    /// Run one cycle at the current market-local time
    pub async fn refresh_now(&self) -> Result<Snapshot, RefreshError> {
        self.refresh_at(market_now()).await
    }

    /// Run one cycle as if the market-local time were `now`
    ///
    /// If a cycle is already in flight this waits for it and returns its
    /// outcome instead of starting another one: the error it failed with, or
    /// the snapshot it produced.
    pub async fn refresh_at(&self, now: DateTime<Tz>) -> Result<Snapshot, RefreshError> {
        let _guard = match self.cycle_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Refresh already in flight, waiting for it to finish");
                let _done = self.cycle_lock.lock().await;
                return self.state.read().settled();
            }
        };

        let result = self.run_cycle(now).await;

        let mut state = self.state.write();
        match &result {
            Ok(snapshot) => {
                state.last_snapshot = Some(snapshot.clone());
                state.last_error = None;
            }
            Err(e) => {
                error!(error = %e, "Refresh cycle failed, keeping previous snapshot");
                state.last_error = Some(e.clone());
            }
        }

        result
    }

    /// Refresh on every tick of `download_interval` until `shutdown` resolves
    ///
    /// The first tick fires immediately. A cycle still running when shutdown
    /// resolves is abandoned; artifacts on disk are only ever replaced whole.
    pub async fn run<S>(&self, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!(
            interval_secs = self.config.download_interval,
            "Starting refresh loop"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping refresh loop");
                    break;
                }
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.refresh_now() => {
                            if let Ok(snapshot) = result {
                                info!(
                                    current_price = snapshot.current_price,
                                    daily_average = snapshot.daily_average,
                                    status = snapshot.download_status.as_str(),
                                    "Refresh cycle complete"
                                );
                            }
                        }
                        _ = &mut shutdown => {
                            info!("Shutdown requested mid-cycle, abandoning refresh");
                            break;
                        }
                    }
                }
            }
        }
    }

    // ========================================================================
    // Cycle steps
    // ========================================================================

    async fn run_cycle(&self, now: DateTime<Tz>) -> Result<Snapshot, RefreshError> {
        let today = now.date_naive();
        let tomorrow = today
            .succ_opt()
            .ok_or_else(|| RefreshError::Unexpected(format!("No calendar day after {}", today)))?;

        info!(%today, hour = now.hour(), "Starting refresh cycle");

        // Check today
        if !self.check_cached(today) {
            self.fetch_and_store(today).await;
        }

        // Check tomorrow
        let tomorrow_cached = self.check_cached(tomorrow);

        // Decide tomorrow fetch
        let age = tomorrow_cached
            .then(|| self.cache.age_hours_at(tomorrow, now.with_timezone(&Utc)))
            .flatten();
        if should_fetch_tomorrow(age, now.hour()) {
            debug!(%tomorrow, age_hours = ?age, "Fetching tomorrow's report");
            self.fetch_and_store(tomorrow).await;
        }

        // Build snapshot
        let today_dataset = self.load(today);
        let tomorrow_dataset = self.load(tomorrow);

        if today_dataset.is_none() {
            warn!(%today, "No prices available for today");
        }

        Ok(build_snapshot(now, today_dataset, tomorrow_dataset))
    }

    /// Rebuild `date` from its raw artifact when the parsed one is stale or
    /// unreadable; returns whether a readable dataset is cached afterwards
    fn check_cached(&self, date: NaiveDate) -> bool {
        let stale = self.cache.is_stale(date, None);
        if stale && self.reprocess(date) {
            return true;
        }

        match self.cache.read_dataset(date) {
            Ok(dataset) => dataset.is_some(),
            Err(e) => {
                warn!(%date, error = %e, "Cached dataset unreadable");
                !stale && self.cache.has_raw(date) && self.reprocess(date)
            }
        }
    }

    /// Cached dataset for `date`; an unreadable artifact counts as absent
    fn load(&self, date: NaiveDate) -> Option<DailyDataset> {
        self.cache.read_dataset(date).unwrap_or_else(|e| {
            warn!(%date, error = %e, "Ignoring unreadable dataset");
            None
        })
    }

    /// Re-parse the cached raw artifact; returns whether it succeeded
    fn reprocess(&self, date: NaiveDate) -> bool {
        let outcome = self
            .cache
            .read_raw(date)
            .map_err(RefreshError::from)
            .and_then(|raw| {
                raw.ok_or_else(|| RefreshError::Unexpected(format!("No raw artifact for {}", date)))
            })
            .and_then(|raw| parse_daily_csv(&raw, date).map_err(RefreshError::from))
            .and_then(|parsed| self.store_parsed(date, parsed));

        match outcome {
            Ok(hours) => {
                info!(%date, hours, "Reprocessed cached raw report");
                true
            }
            Err(e) => {
                warn!(%date, error = %e, "Reprocessing failed");
                false
            }
        }
    }

    /// Fetch, save and parse one day; failures mean "not available yet"
    async fn fetch_and_store(&self, date: NaiveDate) -> bool {
        match self.try_fetch_and_store(date).await {
            Ok(hours) => {
                info!(%date, hours, "Downloaded and stored report");
                true
            }
            Err(e) => {
                warn!(%date, error = %e, "Report not available");
                false
            }
        }
    }

    async fn try_fetch_and_store(&self, date: NaiveDate) -> Result<usize, RefreshError> {
        let raw = self.fetcher.fetch(date).await?;
        self.cache.write_raw(date, &raw)?;
        let parsed = parse_daily_csv(&raw, date)?;
        self.store_parsed(date, parsed)
    }

    fn store_parsed(&self, date: NaiveDate, parsed: ParsedDay) -> Result<usize, RefreshError> {
        if let Some(warning) = parsed.warning() {
            warn!(%date, "{}", warning);
        }
        if parsed.from_daily_average {
            info!(%date, "Using daily average for every hour");
        }

        let dataset = self.cache.write_dataset(date, parsed.records)?;
        Ok(dataset.total_hours)
    }
}
