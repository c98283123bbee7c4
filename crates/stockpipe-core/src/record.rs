//! Daily price records and the extract artifact that carries them between
//! the extraction and load stages.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::symbol::Symbol;

/// One trading day of OHLCV data for one symbol, as normalised from the quote
/// API. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
  pub date:   NaiveDate,
  pub symbol: Symbol,
  pub open:   f64,
  pub high:   f64,
  pub low:    f64,
  pub close:  f64,
  pub volume: u64,
}

/// Every record gathered by one extraction run, tagged with the day the run
/// happened.
///
/// Record order carries no meaning; rows are keyed by `(date, symbol)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractArtifact {
  pub extracted_on: NaiveDate,
  pub records:      Vec<PriceRecord>,
}

impl ExtractArtifact {
  pub fn new(extracted_on: NaiveDate, records: Vec<PriceRecord>) -> Self {
    Self { extracted_on, records }
  }

  pub fn len(&self) -> usize { self.records.len() }

  pub fn is_empty(&self) -> bool { self.records.is_empty() }

  /// Distinct symbols present in the artifact, sorted.
  pub fn symbols(&self) -> Vec<Symbol> {
    let mut out: Vec<Symbol> = self.records.iter().map(|r| r.symbol.clone()).collect();
    out.sort();
    out.dedup();
    out
  }
}
