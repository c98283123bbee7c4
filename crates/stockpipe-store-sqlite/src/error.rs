//! Error type for `stockpipe-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  /// SQLite integers are signed 64-bit; larger volumes cannot be stored.
  #[error("volume {0} does not fit in an INTEGER column")]
  VolumeOverflow(u64),

  #[error("unknown relation type in sqlite_master: {0:?}")]
  UnknownRelationKind(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
