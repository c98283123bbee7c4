//! End-to-end tests for the pipeline stages against an in-memory store and a
//! fake quote source.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{NaiveDate, NaiveDateTime};
use stockpipe_core::{
  fetch::{FetchError, QuoteFetcher},
  record::{ExtractArtifact, PriceRecord},
  store::PriceStore,
  symbol::Symbol,
};
use stockpipe_store_sqlite::SqliteStore;

use crate::{
  error::{BoxError, LoadError},
  extract::Extractor,
  load::Loader,
  opener::StoreOpener,
  orchestrator::{CancelHandle, Orchestrator, PipelineState, Stage, StageFailure},
  staging::Staging,
  transform::{ScriptSource, TransformRunner},
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// Answers from a fixed table; unknown symbols yield `NoData`.
#[derive(Default)]
struct FakeFetcher {
  responses: HashMap<String, Result<Vec<PriceRecord>, FetchError>>,
  calls:     Arc<AtomicUsize>,
}

impl FakeFetcher {
  fn with(mut self, symbol: &str, response: Result<Vec<PriceRecord>, FetchError>) -> Self {
    self.responses.insert(symbol.to_owned(), response);
    self
  }

  /// Counts `fetch` calls, readable after the fetcher has been moved.
  fn calls(&self) -> Arc<AtomicUsize> { self.calls.clone() }
}

impl QuoteFetcher for FakeFetcher {
  async fn fetch<'a>(&'a self, symbol: &'a Symbol) -> Result<Vec<PriceRecord>, FetchError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .responses
      .get(symbol.as_str())
      .cloned()
      .unwrap_or(Err(FetchError::NoData))
  }
}

/// A store that can never be opened.
#[derive(Clone)]
struct OfflineStore;

impl StoreOpener for OfflineStore {
  type Store = SqliteStore;

  async fn open(&self) -> Result<SqliteStore, BoxError> { Err("store offline".into()) }
}

/// Trips `cancel` whenever the store is opened, then opens `inner`.
#[derive(Clone)]
struct CancellingOpener<O> {
  inner:  O,
  cancel: CancelHandle,
}

impl<O: StoreOpener> StoreOpener for CancellingOpener<O> {
  type Store = O::Store;

  async fn open(&self) -> Result<O::Store, BoxError> {
    self.cancel.cancel();
    self.inner.open().await
  }
}

fn apr(d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(2025, 4, d).unwrap() }

fn evening(date: NaiveDate) -> NaiveDateTime { date.and_hms_opt(18, 0, 0).unwrap() }

fn record(symbol: &str, date: NaiveDate, close: f64) -> PriceRecord {
  PriceRecord {
    date,
    symbol: Symbol::parse(symbol).unwrap(),
    open: close,
    high: close + 0.5,
    low: close - 0.5,
    close,
    volume: 1_000,
  }
}

fn symbols(raw: &[&str]) -> Vec<Symbol> {
  raw.iter().map(|s| Symbol::parse(s).unwrap()).collect()
}

async fn memory_store() -> SqliteStore { SqliteStore::open_in_memory().await.unwrap() }

async fn scalar(store: &SqliteStore, sql: &str) -> String {
  store.query(sql.to_owned()).await.unwrap().rows[0][0].clone()
}

// ─── Extract → load ──────────────────────────────────────────────────────────

#[tokio::test]
async fn reloading_an_artifact_appends_a_second_batch() {
  let dir = tempfile::tempdir().unwrap();
  let staging = Staging::new(dir.path());
  let store = memory_store().await;

  let fetcher = FakeFetcher::default()
    .with("AAA", Ok(vec![record("AAA", apr(1), 10.0)]))
    .with("BBB", Ok(vec![record("BBB", apr(1), 20.0)]));
  let extraction = Extractor::new(fetcher, staging.clone())
    .extract_on(&symbols(&["AAA", "BBB"]), apr(1))
    .await
    .unwrap();
  assert_eq!(extraction.artifact.len(), 2);
  assert_eq!(extraction.summary.path, staging.path_for(apr(1)));

  let loader = Loader::new(store.clone(), staging);
  let first = loader
    .load_from_at(&extraction.summary.path, evening(apr(1)))
    .await
    .unwrap();
  assert_eq!(first.batch_id.as_str(), "20250401_180000");
  assert_eq!(first.row_count, 2);

  let second = loader
    .load_from_at(&extraction.summary.path, evening(apr(1)))
    .await
    .unwrap();
  assert_ne!(second.batch_id, first.batch_id);
  assert_eq!(second.batch_id.as_str(), "20250401_180000_001");
  assert_eq!(second.row_count, 2);

  let batches = store.list_batches().await.unwrap();
  assert_eq!(batches.len(), 2);
  assert!(batches.iter().all(|b| b.row_count == 2));
  assert_eq!(scalar(&store, "SELECT COUNT(*) FROM daily_stock_prices").await, "4");
}

#[tokio::test]
async fn later_load_gets_plain_timestamp_id() {
  let dir = tempfile::tempdir().unwrap();
  let staging = Staging::new(dir.path());
  let loader = Loader::new(memory_store().await, staging.clone());

  let artifact = stockpipe_core::record::ExtractArtifact::new(apr(1), vec![record(
    "AAA",
    apr(1),
    10.0,
  )]);
  let path = staging.write(&artifact).unwrap();

  loader.load_from_at(&path, evening(apr(1))).await.unwrap();
  let next = loader
    .load_from_at(&path, apr(1).and_hms_opt(18, 0, 1).unwrap())
    .await
    .unwrap();
  assert_eq!(next.batch_id.as_str(), "20250401_180001");
}

#[tokio::test]
async fn missing_artifact_fails_load() {
  let dir = tempfile::tempdir().unwrap();
  let loader = Loader::new(memory_store().await, Staging::new(dir.path()));

  let err = loader.load_staged(apr(1)).await.unwrap_err();
  assert!(matches!(err, LoadError::ArtifactMissing(_)), "{err:?}");
}

#[tokio::test]
async fn corrupt_artifact_is_unreadable() {
  let dir = tempfile::tempdir().unwrap();
  let staging = Staging::new(dir.path());
  std::fs::write(staging.path_for(apr(1)), "date,symbol\nnot-a-date,AAA\n").unwrap();

  let loader = Loader::new(memory_store().await, staging);
  let err = loader.load_staged(apr(1)).await.unwrap_err();
  assert!(matches!(err, LoadError::ArtifactUnreadable(_)), "{err:?}");
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

fn orchestrator<O: StoreOpener + Clone>(
  fetcher: FakeFetcher,
  opener: O,
  staging: Staging,
  raw: &[&str],
) -> Orchestrator<FakeFetcher, O> {
  Orchestrator::new(fetcher, opener, staging, symbols(raw), ScriptSource::Bundled)
}

#[tokio::test]
async fn failing_symbols_are_skipped_and_run_completes() {
  let dir = tempfile::tempdir().unwrap();
  let store = memory_store().await;
  let fetcher = FakeFetcher::default()
    .with("AAA", Ok(vec![record("AAA", apr(1), 1.0)]))
    .with("BBB", Err(FetchError::ProviderRejected("Invalid API call".into())))
    .with("CCC", Ok(vec![record("CCC", apr(1), 3.0)]))
    .with("DDD", Err(FetchError::Timeout))
    .with("EEE", Ok(vec![record("EEE", apr(1), 5.0)]));

  let report = orchestrator(fetcher, store.clone(), Staging::new(dir.path()), &[
    "AAA", "BBB", "CCC", "DDD", "EEE",
  ])
  .run_at(evening(apr(1)))
  .await;

  assert_eq!(report.state, PipelineState::Done);
  assert_eq!(report.exit_code(), 0);

  let extract = report.extract.as_ref().unwrap();
  assert_eq!(extract.record_count, 3);
  let fetched: Vec<&str> = extract.fetched.iter().map(Symbol::as_str).collect();
  assert_eq!(fetched, ["AAA", "CCC", "EEE"]);
  let skipped: Vec<&str> = extract.skipped.iter().map(|s| s.symbol.as_str()).collect();
  assert_eq!(skipped, ["BBB", "DDD"]);
  assert_eq!(extract.skipped[1].error, FetchError::Timeout);

  assert_eq!(report.load.as_ref().unwrap().row_count, 3);
  assert_eq!(report.transform.as_ref().unwrap().failed(), 0);
}

#[tokio::test]
async fn no_data_anywhere_ends_quietly() {
  let dir = tempfile::tempdir().unwrap();
  let staging = Staging::new(dir.path());
  let store = memory_store().await;

  let report = orchestrator(FakeFetcher::default(), store.clone(), staging.clone(), &[
    "AAA", "BBB",
  ])
  .run_at(evening(apr(1)))
  .await;

  assert_eq!(report.state, PipelineState::Done);
  assert!(report.empty_result);
  assert!(report.extract.is_none());
  assert!(report.load.is_none());
  assert!(report.transform.is_none());
  assert_eq!(report.exit_code(), 0);
  assert!(!staging.path_for(apr(1)).exists());
  assert!(store.list_relations().await.unwrap().is_empty());
}

#[tokio::test]
async fn unavailable_store_fails_the_load_stage() {
  let dir = tempfile::tempdir().unwrap();
  let fetcher = FakeFetcher::default().with("AAA", Ok(vec![record("AAA", apr(1), 1.0)]));

  let report = orchestrator(fetcher, OfflineStore, Staging::new(dir.path()), &["AAA"])
    .run_at(evening(apr(1)))
    .await;

  assert_eq!(report.state, PipelineState::Failed(Stage::Load));
  assert_eq!(report.exit_code(), 3);
  assert!(report.extract.is_some());
  assert!(report.transform.is_none());
  assert!(matches!(
    report.failure,
    Some(StageFailure::Load(LoadError::StoreUnavailable(_)))
  ));
}

#[tokio::test]
async fn cancelled_run_does_not_start() {
  let dir = tempfile::tempdir().unwrap();
  let fetcher = FakeFetcher::default().with("AAA", Ok(vec![record("AAA", apr(1), 1.0)]));
  let staging = Staging::new(dir.path());

  let orch = orchestrator(fetcher, memory_store().await, staging.clone(), &["AAA"]);
  orch.cancel_handle().cancel();
  let report = orch.run_at(evening(apr(1))).await;

  assert_eq!(report.state, PipelineState::Cancelled(Stage::Extract));
  assert_eq!(report.exit_code(), 130);
  assert!(report.extract.is_none());
  assert!(!staging.path_for(apr(1)).exists());
}

#[tokio::test]
async fn full_run_builds_performance_view() {
  let dir = tempfile::tempdir().unwrap();
  let store = memory_store().await;
  let fetcher = FakeFetcher::default()
    .with("AAA", Ok(vec![record("AAA", apr(1), 11.0), record("AAA", apr(2), 10.0)]))
    .with("BBB", Ok(vec![record("BBB", apr(1), 20.0)]));
  let orch = orchestrator(fetcher, store.clone(), Staging::new(dir.path()), &["AAA", "BBB"]);

  let report = orch.run_at(evening(apr(2))).await;
  assert!(report.is_success(), "{report:?}");

  let first_day = scalar(
    &store,
    "SELECT daily_change_pct FROM stock_performance WHERE symbol = 'AAA' AND date = '2025-04-01'",
  )
  .await;
  assert_eq!(first_day, "NULL");
  let second_day = scalar(
    &store,
    "SELECT daily_change_pct FROM stock_performance WHERE symbol = 'AAA' AND date = '2025-04-02'",
  )
  .await;
  assert_eq!(second_day.parse::<f64>().unwrap(), -9.0909);

  // A second run reloads the same rows; derived views see only the newest batch.
  let again = orch.run_at(evening(apr(2))).await;
  assert_eq!(again.load.as_ref().unwrap().batch_id.as_str(), "20250402_180000_001");
  assert_eq!(scalar(&store, "SELECT COUNT(*) FROM daily_stock_prices").await, "6");
  assert_eq!(scalar(&store, "SELECT COUNT(*) FROM latest_stock_prices").await, "3");
  assert_eq!(
    scalar(&store, "SELECT trading_days FROM symbol_summary WHERE symbol = 'AAA'").await,
    "2"
  );
}

#[tokio::test]
async fn cancel_after_load_skips_transform() {
  let dir = tempfile::tempdir().unwrap();
  let store = memory_store().await;
  let cancel = CancelHandle::default();
  let fetcher = FakeFetcher::default().with("AAA", Ok(vec![record("AAA", apr(1), 1.0)]));
  let opener = CancellingOpener { inner: store.clone(), cancel: cancel.clone() };

  let report = orchestrator(fetcher, opener, Staging::new(dir.path()), &["AAA"])
    .with_cancel_handle(cancel)
    .run_at(evening(apr(1)))
    .await;

  assert_eq!(report.state, PipelineState::Cancelled(Stage::Transform));
  assert_eq!(report.exit_code(), 130);
  assert_eq!(report.load.as_ref().unwrap().row_count, 1);
  assert!(report.transform.is_none());
  let names: Vec<String> = store
    .list_relations()
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.name)
    .collect();
  assert!(!names.iter().any(|n| n == "stock_performance"), "{names:?}");
}

#[tokio::test]
async fn newest_of_many_same_second_batches_wins() {
  let dir = tempfile::tempdir().unwrap();
  let store = memory_store().await;
  let loader = Loader::new(store.clone(), Staging::new(dir.path()));

  for close in 0..=10 {
    let artifact = ExtractArtifact::new(apr(1), vec![record("AAA", apr(1), f64::from(close))]);
    loader.load_at(&artifact, evening(apr(1))).await.unwrap();
  }
  let batches = store.list_batches().await.unwrap();
  assert_eq!(batches.len(), 11);
  assert_eq!(batches.last().unwrap().batch_id.as_str(), "20250401_180000_010");

  let summary = TransformRunner::new(store.clone())
    .run_source(&ScriptSource::Bundled)
    .await;
  assert_eq!(summary.failed(), 0, "{summary:?}");
  let close = scalar(&store, "SELECT close FROM latest_stock_prices WHERE symbol = 'AAA'").await;
  assert_eq!(close.parse::<f64>().unwrap(), 10.0);
}

// ─── Retries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_runs_are_retried_up_to_the_limit() {
  let dir = tempfile::tempdir().unwrap();
  let fetcher = FakeFetcher::default().with("AAA", Ok(vec![record("AAA", apr(1), 1.0)]));
  let calls = fetcher.calls();

  let report = orchestrator(fetcher, OfflineStore, Staging::new(dir.path()), &["AAA"])
    .run_with_retries(2, Duration::ZERO)
    .await;

  assert_eq!(report.state, PipelineState::Failed(Stage::Load));
  assert_eq!(report.attempts, 3);
  assert_eq!(calls.load(Ordering::SeqCst), 3);
  assert_eq!(report.exit_code(), 3);
}

#[tokio::test]
async fn successful_and_empty_runs_are_not_retried() {
  let dir = tempfile::tempdir().unwrap();
  let fetcher = FakeFetcher::default().with("AAA", Ok(vec![record("AAA", apr(1), 1.0)]));
  let calls = fetcher.calls();
  let report = orchestrator(fetcher, memory_store().await, Staging::new(dir.path()), &["AAA"])
    .run_with_retries(3, Duration::ZERO)
    .await;
  assert!(report.is_success(), "{report:?}");
  assert_eq!(report.attempts, 1);
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  let empty = FakeFetcher::default();
  let calls = empty.calls();
  let report = orchestrator(empty, memory_store().await, Staging::new(dir.path()), &["AAA"])
    .run_with_retries(3, Duration::ZERO)
    .await;
  assert!(report.empty_result);
  assert_eq!(report.attempts, 1);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn cancel_cuts_the_retry_delay_short() {
  let dir = tempfile::tempdir().unwrap();
  let cancel = CancelHandle::default();
  let fetcher = FakeFetcher::default().with("AAA", Ok(vec![record("AAA", apr(1), 1.0)]));
  let calls = fetcher.calls();
  // The first run fails in load and trips the handle on the way.
  let opener = CancellingOpener { inner: OfflineStore, cancel: cancel.clone() };
  let orch = orchestrator(fetcher, opener, Staging::new(dir.path()), &["AAA"])
    .with_cancel_handle(cancel);

  let report = tokio::time::timeout(
    Duration::from_secs(10),
    orch.run_with_retries(1, Duration::from_secs(3600)),
  )
  .await
  .expect("retry delay was not interrupted");

  assert_eq!(report.state, PipelineState::Cancelled(Stage::Extract));
  assert_eq!(report.attempts, 2);
  assert_eq!(report.exit_code(), 130);
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}
