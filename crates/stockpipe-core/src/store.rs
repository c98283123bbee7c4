//! The `PriceStore` trait and supporting read types.
//!
//! The trait is implemented by storage backends (e.g. `stockpipe-store-sqlite`).
//! The load and transform stages depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  batch::{BatchId, BatchInfo},
  record::PriceRecord,
};

// ─── Read types ──────────────────────────────────────────────────────────────

/// Whether a named relation in the store is a base table or a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
  Table,
  View,
}

/// A table or view present in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
  pub name: String,
  pub kind: RelationKind,
}

/// Rows of an ad-hoc query, every cell rendered as text (`NULL` for nulls).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
  pub columns: Vec<String>,
  pub rows:    Vec<Vec<String>>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the historized price store.
///
/// Price rows are strictly append-only: no method updates or deletes a row in
/// the raw price table. Derived views are rebuilt through
/// [`PriceStore::execute_statement`].
pub trait PriceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create the raw price table if it does not exist. Calling this on an
  /// initialised store is a no-op.
  fn ensure_schema(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Whether any row is already tagged with `batch_id`.
  fn batch_exists(
    &self,
    batch_id: BatchId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Insert every record tagged with `batch_id` in one transaction and return
  /// the number of rows written. Never updates an existing row.
  fn append_batch(
    &self,
    batch_id: BatchId,
    records: Vec<PriceRecord>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Count the rows currently stored under `batch_id`.
  fn count_batch(
    &self,
    batch_id: BatchId,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// All batches with their row counts, oldest first.
  fn list_batches(&self) -> impl Future<Output = Result<Vec<BatchInfo>, Self::Error>> + Send + '_;

  /// Execute one SQL statement as its own atomic unit.
  fn execute_statement(
    &self,
    sql: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Tables and views in the store, sorted by name.
  fn list_relations(&self) -> impl Future<Output = Result<Vec<Relation>, Self::Error>> + Send + '_;

  /// Run a read query and return its rows as text.
  fn query(
    &self,
    sql: String,
  ) -> impl Future<Output = Result<QueryOutput, Self::Error>> + Send + '_;
}
