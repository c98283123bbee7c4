//! Runs extract, load and transform in sequence.
//!
//! A single run ends in exactly one of `Done`, `Failed(stage)` or
//! `Cancelled(stage)` and is described by a [`RunReport`].
//! [`Orchestrator::run_with_retries`] repeats failed runs on behalf of the
//! scheduler.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{Local, NaiveDateTime};
use stockpipe_core::{batch::LoadSummary, fetch::QuoteFetcher, symbol::Symbol};
use tokio::sync::watch;

use crate::{
  error::{ExtractError, LoadError},
  extract::{ExtractSummary, Extractor},
  load::Loader,
  opener::StoreOpener,
  staging::Staging,
  transform::{ScriptSource, TransformRunner, TransformSummary},
};

/// Exit code of a run whose extraction failed.
pub const EXIT_EXTRACT_FAILED: u8 = 2;
/// Exit code of a run whose load failed.
pub const EXIT_LOAD_FAILED: u8 = 3;
/// Exit code of a cancelled run, as for SIGINT.
pub const EXIT_CANCELLED: u8 = 130;

// ─── States ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Extract,
  Load,
  Transform,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Stage::Extract => "extract",
      Stage::Load => "load",
      Stage::Transform => "transform",
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
  Idle,
  Extracting,
  Loading,
  Transforming,
  Done,
  Failed(Stage),
  Cancelled(Stage),
}

impl fmt::Display for PipelineState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      PipelineState::Idle => f.write_str("idle"),
      PipelineState::Extracting => f.write_str("extracting"),
      PipelineState::Loading => f.write_str("loading"),
      PipelineState::Transforming => f.write_str("transforming"),
      PipelineState::Done => f.write_str("done"),
      PipelineState::Failed(stage) => write!(f, "failed in {stage}"),
      PipelineState::Cancelled(stage) => write!(f, "cancelled before {stage}"),
    }
  }
}

/// The error that stopped a run.
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
  #[error("extract failed: {0}")]
  Extract(#[source] ExtractError),
  #[error("load failed: {0}")]
  Load(#[source] LoadError),
}

impl StageFailure {
  pub fn stage(&self) -> Stage {
    match self {
      StageFailure::Extract(_) => Stage::Extract,
      StageFailure::Load(_) => Stage::Load,
    }
  }

  pub fn exit_code(&self) -> u8 {
    match self {
      StageFailure::Extract(_) => EXIT_EXTRACT_FAILED,
      StageFailure::Load(_) => EXIT_LOAD_FAILED,
    }
  }
}

// ─── Cancellation ─────────────────────────────────────────────────────────────

/// Asks a running pipeline to stop. Checked before each stage starts; a stage
/// already in progress runs to completion. A retry delay is cut short.
#[derive(Debug, Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl Default for CancelHandle {
  fn default() -> Self { Self(Arc::new(watch::channel(false).0)) }
}

impl CancelHandle {
  pub fn cancel(&self) { self.0.send_replace(true); }

  pub fn is_cancelled(&self) -> bool { *self.0.borrow() }

  /// Resolves once [`cancel`](Self::cancel) has been called.
  pub async fn cancelled(&self) {
    let mut rx = self.0.subscribe();
    // The sender lives in `self`, so the channel cannot close while waiting.
    rx.wait_for(|cancelled| *cancelled).await.ok();
  }
}

// ─── Report ───────────────────────────────────────────────────────────────────

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct RunReport {
  pub state:        PipelineState,
  pub extract:      Option<ExtractSummary>,
  pub load:         Option<LoadSummary>,
  pub transform:    Option<TransformSummary>,
  pub failure:      Option<StageFailure>,
  /// Extraction found nothing; load and transform were skipped.
  pub empty_result: bool,
  /// Runs made to reach this outcome, counting the first.
  pub attempts:     u32,
}

impl RunReport {
  fn new() -> Self {
    Self {
      state:        PipelineState::Idle,
      extract:      None,
      load:         None,
      transform:    None,
      failure:      None,
      empty_result: false,
      attempts:     1,
    }
  }

  pub fn is_success(&self) -> bool { self.state == PipelineState::Done }

  pub fn is_failed(&self) -> bool { matches!(self.state, PipelineState::Failed(_)) }

  pub fn exit_code(&self) -> u8 {
    if let Some(failure) = &self.failure {
      return failure.exit_code();
    }
    match self.state {
      PipelineState::Cancelled(_) => EXIT_CANCELLED,
      _ => 0,
    }
  }
}

// ─── Orchestrator ─────────────────────────────────────────────────────────────

pub struct Orchestrator<F, O> {
  symbols:     Vec<Symbol>,
  script:      ScriptSource,
  extractor:   Extractor<F>,
  loader:      Loader<O>,
  transformer: TransformRunner<O>,
  cancel:      CancelHandle,
}

impl<F, O> Orchestrator<F, O>
where
  F: QuoteFetcher,
  O: StoreOpener + Clone,
{
  pub fn new(
    fetcher: F,
    opener: O,
    staging: Staging,
    symbols: Vec<Symbol>,
    script: ScriptSource,
  ) -> Self {
    Self {
      symbols,
      script,
      extractor: Extractor::new(fetcher, staging.clone()),
      loader: Loader::new(opener.clone(), staging),
      transformer: TransformRunner::new(opener),
      cancel: CancelHandle::default(),
    }
  }

  /// Share `cancel` with other owners instead of a private handle.
  pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
    self.cancel = cancel;
    self
  }

  /// A handle that stops this orchestrator's runs before their next stage.
  pub fn cancel_handle(&self) -> CancelHandle { self.cancel.clone() }

  pub async fn run(&self) -> RunReport { self.run_at(Local::now().naive_local()).await }

  /// Run, and run again after `delay` while the run ends in `Failed`, up to
  /// `retries` extra times. `Done` and `Cancelled` are never retried.
  /// Cancelling during the delay starts the next run at once, which then
  /// stops before extraction.
  pub async fn run_with_retries(&self, retries: u32, delay: Duration) -> RunReport {
    let mut attempt = 1;
    loop {
      let mut report = self.run().await;
      report.attempts = attempt;
      if !report.is_failed() || attempt > retries {
        return report;
      }

      tracing::warn!(
        attempt,
        retries,
        delay_secs = delay.as_secs(),
        state = %report.state,
        "run failed; retrying after delay"
      );
      tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = self.cancel.cancelled() => {
          tracing::warn!("cancelled during retry delay");
        }
      }
      attempt += 1;
    }
  }

  /// Run all three stages as of `at`: the artifact is dated `at`'s day and
  /// the batch id derives from `at`.
  pub async fn run_at(&self, at: NaiveDateTime) -> RunReport {
    let mut report = RunReport::new();
    tracing::info!(symbols = self.symbols.len(), "pipeline run starting");

    // Extract.
    if self.cancelled_before(Stage::Extract, &mut report) {
      return report;
    }
    self.enter(PipelineState::Extracting, &mut report);
    let extraction = match self.extractor.extract_on(&self.symbols, at.date()).await {
      Ok(extraction) => extraction,
      Err(ExtractError::EmptyResult) => {
        tracing::warn!("no data extracted; skipping load and transform");
        report.empty_result = true;
        self.enter(PipelineState::Done, &mut report);
        return report;
      }
      Err(e) => return self.fail(StageFailure::Extract(e), report),
    };
    let artifact_path = extraction.summary.path.clone();
    report.extract = Some(extraction.summary);

    // Load.
    if self.cancelled_before(Stage::Load, &mut report) {
      return report;
    }
    self.enter(PipelineState::Loading, &mut report);
    match self.loader.load_from_at(&artifact_path, at).await {
      Ok(summary) => report.load = Some(summary),
      Err(e) => return self.fail(StageFailure::Load(e), report),
    }

    // Transform.
    if self.cancelled_before(Stage::Transform, &mut report) {
      return report;
    }
    self.enter(PipelineState::Transforming, &mut report);
    report.transform = Some(self.transformer.run_source(&self.script).await);

    self.enter(PipelineState::Done, &mut report);
    report
  }

  fn enter(&self, state: PipelineState, report: &mut RunReport) {
    tracing::info!(from = %report.state, to = %state, "pipeline state");
    report.state = state;
  }

  fn cancelled_before(&self, stage: Stage, report: &mut RunReport) -> bool {
    if !self.cancel.is_cancelled() {
      return false;
    }
    tracing::warn!(%stage, "run cancelled");
    self.enter(PipelineState::Cancelled(stage), report);
    true
  }

  fn fail(&self, failure: StageFailure, mut report: RunReport) -> RunReport {
    let stage = failure.stage();
    tracing::error!(%stage, error = %failure, "pipeline stage failed");
    self.enter(PipelineState::Failed(stage), &mut report);
    report.failure = Some(failure);
    report
  }
}
