//! Batch identifiers and load bookkeeping.
//!
//! Every load run tags its rows with a fresh [`BatchId`]. Because the id is
//! part of the primary key, re-loading the same `(date, symbol)` produces a
//! new row instead of overwriting the old one.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identifier of one load run, derived from the load time at second
/// granularity (`20250401_180000`).
///
/// Two loads started within the same second produce the same base id; the
/// loader disambiguates with [`BatchId::with_sequence`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
  /// `strftime` layout of the timestamp part.
  pub const FORMAT: &'static str = "%Y%m%d_%H%M%S";

  pub fn from_timestamp(at: NaiveDateTime) -> Self {
    Self(at.format(Self::FORMAT).to_string())
  }

  /// The same id with a zero-padded `_NNN` suffix appended, so suffixed ids
  /// still sort in load order.
  pub fn with_sequence(&self, seq: u32) -> Self { Self(format!("{}_{seq:03}", self.0)) }

  /// Wrap an id read back from the store.
  pub fn from_stored(raw: String) -> Self { Self(raw) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for BatchId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
  pub batch_id:  BatchId,
  /// Rows counted in the store for `batch_id` after the write committed.
  pub row_count: u64,
}

/// A batch as listed from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInfo {
  pub batch_id:  BatchId,
  pub row_count: u64,
}
