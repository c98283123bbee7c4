//! Error types for the pipeline stages.
//!
//! Only [`ExtractError`] and [`LoadError`] can stop a run. Per-symbol fetch
//! failures are absorbed by the extraction stage, and statement failures by
//! the transform runner.

use std::path::PathBuf;

use thiserror::Error;

/// A boxed backend error, as returned by a [`crate::opener::StoreOpener`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read configuration: {0}")]
  Source(#[from] config::ConfigError),

  #[error("no symbols configured")]
  NoSymbols,

  #[error(transparent)]
  InvalidSymbol(#[from] stockpipe_core::Error),

  #[error("transform script not found: {0}")]
  ScriptMissing(PathBuf),
}

#[derive(Debug, Error)]
pub enum StagingError {
  #[error("staged artifact not found: {0}")]
  Missing(PathBuf),

  #[error("staging I/O error on {path}: {source}")]
  Io {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("staging CSV error on {path}: {source}")]
  Csv {
    path:   PathBuf,
    #[source]
    source: csv::Error,
  },
}

#[derive(Debug, Error)]
pub enum ExtractError {
  /// No symbol produced any record. A legitimate outcome (e.g. a market
  /// holiday); the pipeline stops quietly.
  #[error("no symbol returned any data")]
  EmptyResult,

  #[error("failed to stage extract artifact: {0}")]
  Staging(#[source] StagingError),
}

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("extract artifact not found: {0}")]
  ArtifactMissing(PathBuf),

  #[error("extract artifact unreadable: {0}")]
  ArtifactUnreadable(#[source] StagingError),

  #[error("store unavailable: {0}")]
  StoreUnavailable(#[source] BoxError),

  #[error("failed to write batch: {0}")]
  Write(#[source] BoxError),
}

impl From<StagingError> for LoadError {
  fn from(e: StagingError) -> Self {
    match e {
      StagingError::Missing(path) => LoadError::ArtifactMissing(path),
      other => LoadError::ArtifactUnreadable(other),
    }
  }
}
