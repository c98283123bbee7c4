//! How the load and transform stages get hold of a store.
//!
//! The stages open the store themselves, at the moment they start, so an
//! unreachable store fails the load stage (`LoadError::StoreUnavailable`)
//! rather than the whole run before extraction.

use std::{future::Future, path::PathBuf};

use stockpipe_core::store::PriceStore;
use stockpipe_store_sqlite::SqliteStore;

use crate::error::BoxError;

/// Something that can produce a ready-to-use [`PriceStore`].
pub trait StoreOpener: Send + Sync {
  type Store: PriceStore;

  fn open(&self) -> impl Future<Output = Result<Self::Store, BoxError>> + Send + '_;
}

/// A SQLite database file, opened on demand. The parent directory is created
/// if it does not exist yet.
#[derive(Debug, Clone)]
pub struct SqliteFile {
  path: PathBuf,
}

impl SqliteFile {
  pub fn new(path: impl Into<PathBuf>) -> Self { Self { path: path.into() } }
}

impl StoreOpener for SqliteFile {
  type Store = SqliteStore;

  async fn open(&self) -> Result<SqliteStore, BoxError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(parent).await?;
    }
    Ok(SqliteStore::open(&self.path).await?)
  }
}

/// An already-open store opens to a handle on itself.
impl StoreOpener for SqliteStore {
  type Store = SqliteStore;

  async fn open(&self) -> Result<SqliteStore, BoxError> { Ok(self.clone()) }
}
