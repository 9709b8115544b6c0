//! End-to-end refresh cycles against a scripted fetcher and a temp directory

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone};
use chrono_tz::Tz;
use opcom_dam_prices::transformations::MARKET_TZ;
use opcom_dam_prices::{
    CacheError, DailyCache, DownloadStatus, FetchError, Fetcher, RefreshOrchestrator, TariffConfig,
};
use parking_lot::Mutex;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 14).unwrap()
}

fn tomorrow() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()
}

fn local(day: u32, hour: u32, minute: u32) -> DateTime<Tz> {
    MARKET_TZ
        .with_ymd_and_hms(2024, 10, day, hour, minute, 0)
        .unwrap()
}

/// 24-hour report where hour `h` costs `base + h`
fn report(base: u32) -> String {
    let mut csv = String::from("\"Piata pentru Ziua Urmatoare - Raport\"\n");
    csv.push_str(
        r#""Zona de tranzactionare","Interval","Pret de Inchidere [Lei/MWh]","Volum Tranzactionat [MWh]""#,
    );
    csv.push('\n');
    for interval in 1..=24 {
        csv.push_str(&format!(
            "\"Romania\",\"{}\",\"{},25\",\"1 200,0\"\n",
            interval,
            base + interval - 1
        ));
    }
    csv
}

struct ScriptedFetcher {
    responses: HashMap<NaiveDate, Result<String, FetchError>>,
    calls: Mutex<Vec<NaiveDate>>,
    delay: Option<Duration>,
}

impl ScriptedFetcher {
    fn new(responses: Vec<(NaiveDate, Result<String, FetchError>)>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    fn publishing_both_days() -> Self {
        Self::new(vec![
            (today(), Ok(report(300))),
            (tomorrow(), Ok(report(500))),
        ])
    }

    fn calls(&self) -> Vec<NaiveDate> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, date: NaiveDate) -> Result<String, FetchError> {
        self.calls.lock().push(date);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(&date)
            .cloned()
            .unwrap_or(Err(FetchError::BadStatus(404)))
    }
}

fn setup(fetcher: ScriptedFetcher) -> (TempDir, Arc<ScriptedFetcher>, RefreshOrchestrator) {
    let dir = tempfile::tempdir().unwrap();
    let config = TariffConfig {
        data_dir: dir.path().to_path_buf(),
        ..TariffConfig::default()
    };
    let fetcher = Arc::new(fetcher);
    let orchestrator = RefreshOrchestrator::new(config, fetcher.clone()).unwrap();
    (dir, fetcher, orchestrator)
}

fn set_mtime(path: &std::path::Path, when: DateTime<Tz>) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::from(when))
        .unwrap();
}

// ============================================================================
// Cycle behaviour
// ============================================================================

#[tokio::test]
async fn test_first_cycle_fetches_today_and_tomorrow() {
    let (dir, fetcher, orchestrator) = setup(ScriptedFetcher::publishing_both_days());

    let snapshot = orchestrator.refresh_at(local(14, 14, 30)).await.unwrap();

    assert_eq!(fetcher.calls(), vec![today(), tomorrow()]);
    assert_eq!(snapshot.current_price, 314.25);
    assert_eq!(snapshot.next_hour_price, 315.25);
    assert_eq!(snapshot.today.len(), 24);
    assert_eq!(snapshot.tomorrow.len(), 24);
    assert!(snapshot.tomorrow_valid);
    assert_eq!(snapshot.download_status, DownloadStatus::Available);
    assert_eq!(snapshot.forecast_prices[0].price, 500.25);
    assert_eq!(snapshot.stats.min, 300.25);
    assert_eq!(snapshot.stats.max, 323.25);

    for name in ["2024-10-14.csv", "2024-10-14.json", "2024-10-15.csv", "2024-10-15.json"] {
        assert!(dir.path().join(name).is_file(), "missing {}", name);
    }

    let last = orchestrator.get_last_snapshot().unwrap();
    assert_eq!(last.current_price, snapshot.current_price);
    assert!(orchestrator.last_error().is_none());
}

#[tokio::test]
async fn test_second_cycle_uses_cache() {
    let (_dir, fetcher, orchestrator) = setup(ScriptedFetcher::publishing_both_days());

    orchestrator.refresh_at(local(14, 10, 0)).await.unwrap();
    let snapshot = orchestrator.refresh_at(local(14, 10, 15)).await.unwrap();

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(snapshot.current_price, 310.25);
}

#[tokio::test]
async fn test_unpublished_tomorrow_is_pending() {
    let (_dir, fetcher, orchestrator) = setup(ScriptedFetcher::new(vec![
        (today(), Ok(report(300))),
        (tomorrow(), Err(FetchError::BadStatus(404))),
    ]));

    let snapshot = orchestrator.refresh_at(local(14, 9, 0)).await.unwrap();

    assert_eq!(fetcher.calls(), vec![today(), tomorrow()]);
    assert_eq!(snapshot.current_price, 309.25);
    assert!(!snapshot.tomorrow_valid);
    assert!(snapshot.tomorrow.is_empty());
    assert_eq!(snapshot.download_status, DownloadStatus::Pending);

    // Absent tomorrow is retried on every cycle
    orchestrator.refresh_at(local(14, 9, 15)).await.unwrap();
    assert_eq!(fetcher.calls(), vec![today(), tomorrow(), tomorrow()]);
}

#[tokio::test]
async fn test_all_fetches_failing_still_yields_snapshot() {
    let (_dir, _fetcher, orchestrator) = setup(ScriptedFetcher::new(vec![
        (today(), Err(FetchError::Transport("connection reset".to_string()))),
        (tomorrow(), Err(FetchError::TooShort(12))),
    ]));

    let snapshot = orchestrator.refresh_at(local(14, 16, 0)).await.unwrap();

    assert_eq!(snapshot.current_price, 0.0);
    assert_eq!(snapshot.next_hour_price, 0.0);
    assert!(snapshot.today.is_empty());
    assert_eq!(snapshot.download_status, DownloadStatus::Pending);
}

#[tokio::test]
async fn test_short_day_report_is_stored() {
    let partial = format!(
        "{}\n\"Romania\",\"1\",\"100\",\"1\"\n\"Romania\",\"2\",\"200\",\"1\"\n{}",
        r#""Zona","Interval","Pret de Inchidere [Lei/MWh]","Volum""#,
        "x".repeat(120)
    );
    let (_dir, _fetcher, orchestrator) = setup(ScriptedFetcher::new(vec![(today(), Ok(partial))]));

    let snapshot = orchestrator.refresh_at(local(14, 1, 0)).await.unwrap();

    assert_eq!(snapshot.today, vec![100.0, 200.0]);
    assert_eq!(snapshot.current_price, 200.0);
    assert_eq!(snapshot.next_hour_price, 0.0);
    assert_eq!(snapshot.stats.peak, 0.0);
}

#[tokio::test]
async fn test_cached_raw_report_is_reprocessed_without_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DailyCache::new(dir.path()).unwrap();
    cache.write_raw(today(), &report(700)).unwrap();

    let config = TariffConfig {
        data_dir: dir.path().to_path_buf(),
        ..TariffConfig::default()
    };
    let fetcher = Arc::new(ScriptedFetcher::publishing_both_days());
    let orchestrator = RefreshOrchestrator::new(config, fetcher.clone()).unwrap();

    let snapshot = orchestrator.refresh_at(local(14, 0, 10)).await.unwrap();

    assert_eq!(fetcher.calls(), vec![tomorrow()]);
    assert_eq!(snapshot.current_price, 700.25);
    assert!(cache.has(today()));
}

#[tokio::test]
async fn test_tomorrow_refetched_after_noon_when_old() {
    let (_dir, fetcher, orchestrator) = setup(ScriptedFetcher::publishing_both_days());
    let cache = orchestrator.cache().clone();

    orchestrator.refresh_at(local(14, 9, 30)).await.unwrap();
    assert_eq!(fetcher.calls().len(), 2);

    // Pretend tomorrow was downloaded at 07:00
    set_mtime(&cache.raw_path(tomorrow()), local(14, 6, 59));
    set_mtime(&cache.parsed_path(tomorrow()), local(14, 7, 0));

    // Old enough but before noon: keep it
    orchestrator.refresh_at(local(14, 9, 45)).await.unwrap();
    assert_eq!(fetcher.calls().len(), 2);

    // After noon: refresh it
    orchestrator.refresh_at(local(14, 14, 30)).await.unwrap();
    assert_eq!(fetcher.calls(), vec![today(), tomorrow(), tomorrow()]);
}

#[tokio::test]
async fn test_corrupt_today_is_rebuilt_from_raw() {
    let (_dir, fetcher, orchestrator) = setup(ScriptedFetcher::publishing_both_days());

    orchestrator.refresh_at(local(14, 12, 0)).await.unwrap();
    std::fs::write(orchestrator.cache().parsed_path(today()), "{\"date\": 7").unwrap();

    let snapshot = orchestrator.refresh_at(local(14, 12, 15)).await.unwrap();

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(snapshot.current_price, 312.25);
    assert!(snapshot.tomorrow_valid);
    assert!(orchestrator.cache().read_dataset(today()).is_ok());
    assert!(orchestrator.last_error().is_none());
}

#[tokio::test]
async fn test_corrupt_today_without_raw_is_refetched() {
    let (dir, fetcher, orchestrator) = setup(ScriptedFetcher::publishing_both_days());
    std::fs::write(dir.path().join("2024-10-14.json"), "garbage").unwrap();

    for minute in [0, 15, 30] {
        let snapshot = orchestrator.refresh_at(local(14, 14, minute)).await.unwrap();
        assert_eq!(snapshot.current_price, 314.25);
    }

    assert_eq!(fetcher.calls(), vec![today(), tomorrow()]);
    assert!(orchestrator.cache().read_dataset(today()).unwrap().is_some());
}

#[tokio::test]
async fn test_corrupt_tomorrow_still_serves_today() {
    let (dir, fetcher, orchestrator) =
        setup(ScriptedFetcher::new(vec![(today(), Ok(report(300)))]));
    std::fs::write(dir.path().join("2024-10-15.json"), "{\"date\": 7").unwrap();

    let snapshot = orchestrator.refresh_at(local(14, 9, 0)).await.unwrap();

    // Unreadable tomorrow counts as absent, so it is fetched again
    assert_eq!(fetcher.calls(), vec![today(), tomorrow()]);
    assert_eq!(snapshot.current_price, 309.25);
    assert_eq!(snapshot.today.len(), 24);
    assert!(!snapshot.tomorrow_valid);
    assert_eq!(snapshot.download_status, DownloadStatus::Pending);
    assert!(matches!(
        orchestrator.cache().read_dataset(tomorrow()),
        Err(CacheError::Corrupt { .. })
    ));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_refreshes_coalesce() {
    let mut fetcher = ScriptedFetcher::publishing_both_days();
    fetcher.delay = Some(Duration::from_millis(100));
    let (_dir, fetcher, orchestrator) = setup(fetcher);

    let (first, second) = tokio::join!(
        orchestrator.refresh_at(local(14, 18, 0)),
        orchestrator.refresh_at(local(14, 18, 0)),
    );

    assert_eq!(fetcher.calls().len(), 2);
    assert_eq!(first.unwrap().current_price, 318.25);
    assert_eq!(second.unwrap().current_price, 318.25);
}

#[tokio::test]
async fn test_coalesced_refresh_shares_cycle_outcome() {
    let mut fetcher = ScriptedFetcher::new(vec![]);
    fetcher.delay = Some(Duration::from_millis(50));
    let (dir, fetcher, orchestrator) = setup(fetcher);
    std::fs::write(dir.path().join("2024-10-14.json"), "not json").unwrap();

    let (first, second) = tokio::join!(
        orchestrator.refresh_at(local(14, 18, 0)),
        orchestrator.refresh_at(local(14, 18, 0)),
    );

    assert_eq!(fetcher.calls(), vec![today(), tomorrow()]);
    assert_eq!(first.unwrap().current_price, 0.0);
    let second = second.unwrap();
    assert_eq!(second.current_price, 0.0);
    assert_eq!(second.download_status, DownloadStatus::Pending);
}

#[tokio::test]
async fn test_run_loop_refreshes_until_shutdown() {
    let (_dir, fetcher, orchestrator) = setup(ScriptedFetcher::new(vec![]));

    let shutdown = tokio::time::sleep(Duration::from_millis(300));
    tokio::time::timeout(Duration::from_secs(10), orchestrator.run(shutdown))
        .await
        .unwrap();

    assert!(!fetcher.calls().is_empty());
    assert!(orchestrator.get_last_snapshot().is_some());
}
