//! The `QuoteFetcher` trait and its error type.
//!
//! Implemented by quote API clients (e.g. `stockpipe-quotes`). The extraction
//! stage depends on this abstraction, never on a concrete client.

use std::future::Future;

use thiserror::Error;

use crate::{record::PriceRecord, symbol::Symbol};

/// Why a symbol (or a single record of it) produced no usable data.
///
/// None of these are fatal to an extraction run: the symbol or record is
/// logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// The provider answered with an error payload (unknown symbol, rate
  /// limit, bad key).
  #[error("provider rejected request: {0}")]
  ProviderRejected(String),

  /// The provider returned no trading data for the requested window.
  #[error("no data returned")]
  NoData,

  /// A single record could not be parsed; only that record is dropped.
  #[error("malformed record for {date}: {reason}")]
  MalformedRecord { date: String, reason: String },

  /// The per-call timeout elapsed.
  #[error("request timed out")]
  Timeout,

  /// Any other transport-level failure (connection refused, non-2xx status,
  /// undecodable body).
  #[error("transport error: {0}")]
  Transport(String),
}

/// Source of daily price records for one symbol at a time.
pub trait QuoteFetcher: Send + Sync {
  /// Fetch the recent daily window for `symbol`.
  ///
  /// Records that fail to parse are dropped inside the fetcher; an `Err` means
  /// the whole symbol yielded nothing.
  fn fetch<'a>(
    &'a self,
    symbol: &'a Symbol,
  ) -> impl Future<Output = Result<Vec<PriceRecord>, FetchError>> + Send + 'a;
}
