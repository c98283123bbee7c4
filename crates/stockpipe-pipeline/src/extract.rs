//! The extraction stage: fetch every configured symbol, keep what succeeded,
//! and stage the result for the loader.

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use stockpipe_core::{
  fetch::{FetchError, QuoteFetcher},
  record::{ExtractArtifact, PriceRecord},
  symbol::Symbol,
};

use crate::{error::ExtractError, staging::Staging};

/// A symbol that contributed nothing to the artifact, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSymbol {
  pub symbol: Symbol,
  pub error:  FetchError,
}

/// What one extraction run produced.
#[derive(Debug, Clone)]
pub struct ExtractSummary {
  pub extracted_on: NaiveDate,
  /// Where the artifact was staged; the loader's input.
  pub path:         PathBuf,
  pub record_count: usize,
  pub fetched:      Vec<Symbol>,
  pub skipped:      Vec<SkippedSymbol>,
}

/// The artifact together with its summary.
#[derive(Debug, Clone)]
pub struct Extraction {
  pub artifact: ExtractArtifact,
  pub summary:  ExtractSummary,
}

/// Runs a [`QuoteFetcher`] over a symbol set.
pub struct Extractor<F> {
  fetcher: F,
  staging: Staging,
}

impl<F: QuoteFetcher> Extractor<F> {
  pub fn new(fetcher: F, staging: Staging) -> Self { Self { fetcher, staging } }

  /// Extract for today's date.
  pub async fn extract(&self, symbols: &[Symbol]) -> Result<Extraction, ExtractError> {
    self.extract_on(symbols, Local::now().date_naive()).await
  }

  /// Fetch each symbol in turn and stage the combined artifact under `day`.
  ///
  /// A failed symbol is logged and left out; it never stops the others.
  /// Returns [`ExtractError::EmptyResult`] (and stages nothing) when no
  /// symbol yields a record.
  pub async fn extract_on(
    &self,
    symbols: &[Symbol],
    day: NaiveDate,
  ) -> Result<Extraction, ExtractError> {
    let mut records: Vec<PriceRecord> = Vec::new();
    let mut fetched = Vec::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
      tracing::info!(%symbol, "fetching daily series");
      match self.fetcher.fetch(symbol).await {
        Ok(rows) if rows.is_empty() => {
          tracing::warn!(%symbol, "no data; skipping");
          skipped.push(SkippedSymbol { symbol: symbol.clone(), error: FetchError::NoData });
        }
        Ok(rows) => {
          tracing::info!(%symbol, records = rows.len(), "fetched");
          records.extend(rows);
          fetched.push(symbol.clone());
        }
        Err(error) => {
          tracing::warn!(%symbol, %error, "fetch failed; skipping");
          skipped.push(SkippedSymbol { symbol: symbol.clone(), error });
        }
      }
    }

    if records.is_empty() {
      tracing::warn!(skipped = skipped.len(), "no data was collected");
      return Err(ExtractError::EmptyResult);
    }

    let artifact = ExtractArtifact::new(day, records);
    let path = self.staging.write(&artifact).map_err(ExtractError::Staging)?;

    tracing::info!(
      path = %path.display(),
      records = artifact.len(),
      fetched = fetched.len(),
      skipped = skipped.len(),
      "extract artifact staged"
    );

    let summary = ExtractSummary {
      extracted_on: day,
      path,
      record_count: artifact.len(),
      fetched,
      skipped,
    };
    Ok(Extraction { artifact, summary })
  }
}
