//! The load stage: append a staged artifact to the store as a new batch.

use std::path::Path;

use chrono::{Local, NaiveDate, NaiveDateTime};
use stockpipe_core::{
  batch::{BatchId, LoadSummary},
  record::ExtractArtifact,
  store::PriceStore,
};

use crate::{error::LoadError, opener::StoreOpener, staging::Staging};

/// Appends extract artifacts to the store, one batch per call.
pub struct Loader<O> {
  opener:  O,
  staging: Staging,
}

impl<O: StoreOpener> Loader<O> {
  pub fn new(opener: O, staging: Staging) -> Self { Self { opener, staging } }

  /// Load today's staged artifact.
  pub async fn load_latest(&self) -> Result<LoadSummary, LoadError> {
    self.load_staged(Local::now().date_naive()).await
  }

  /// Load the artifact staged for `day`.
  pub async fn load_staged(&self, day: NaiveDate) -> Result<LoadSummary, LoadError> {
    self.load_from(&self.staging.path_for(day)).await
  }

  /// Read the artifact at `path` and load it.
  pub async fn load_from(&self, path: &Path) -> Result<LoadSummary, LoadError> {
    self.load_from_at(path, Local::now().naive_local()).await
  }

  /// Read the artifact at `path` and load it under a batch id derived from
  /// `at`.
  pub async fn load_from_at(
    &self,
    path: &Path,
    at: NaiveDateTime,
  ) -> Result<LoadSummary, LoadError> {
    let artifact = self.staging.read(path)?;
    tracing::info!(
      path = %path.display(),
      records = artifact.len(),
      extracted_on = %artifact.extracted_on,
      "read extract artifact"
    );
    self.load_at(&artifact, at).await
  }

  /// Load `artifact` under a batch id taken from the current local time.
  pub async fn load(&self, artifact: &ExtractArtifact) -> Result<LoadSummary, LoadError> {
    self.load_at(artifact, Local::now().naive_local()).await
  }

  /// Load `artifact` under a batch id derived from `at`.
  ///
  /// Every call appends a complete new batch, even for an artifact that was
  /// loaded before. The reported `row_count` is read back from the store
  /// after the write commits.
  pub async fn load_at(
    &self,
    artifact: &ExtractArtifact,
    at: NaiveDateTime,
  ) -> Result<LoadSummary, LoadError> {
    let store = self
      .opener
      .open()
      .await
      .map_err(LoadError::StoreUnavailable)?;
    store
      .ensure_schema()
      .await
      .map_err(|e| LoadError::StoreUnavailable(Box::new(e)))?;

    let batch_id = allocate_batch_id(&store, at).await?;
    if artifact.is_empty() {
      tracing::warn!(%batch_id, "artifact holds no records; batch will be empty");
    }

    let written = store
      .append_batch(batch_id.clone(), artifact.records.clone())
      .await
      .map_err(|e| LoadError::Write(Box::new(e)))?;

    let row_count = store
      .count_batch(batch_id.clone())
      .await
      .map_err(|e| LoadError::Write(Box::new(e)))?;

    if row_count != written as u64 {
      tracing::warn!(%batch_id, written, row_count, "stored row count differs from rows written");
    }
    tracing::info!(%batch_id, row_count, "batch loaded");

    Ok(LoadSummary { batch_id, row_count })
  }
}

/// The second-granularity id for `at`, suffixed `_001`, `_002`, ... if a batch
/// with that id is already stored.
async fn allocate_batch_id<S: PriceStore>(store: &S, at: NaiveDateTime) -> Result<BatchId, LoadError> {
  let base = BatchId::from_timestamp(at);
  let mut candidate = base.clone();
  let mut seq = 0;

  loop {
    let taken = store
      .batch_exists(candidate.clone())
      .await
      .map_err(|e| LoadError::Write(Box::new(e)))?;
    if !taken {
      if seq > 0 {
        tracing::warn!(%base, %candidate, "batch id already used this second; suffixed");
      }
      return Ok(candidate);
    }
    seq += 1;
    candidate = base.with_sequence(seq);
  }
}
