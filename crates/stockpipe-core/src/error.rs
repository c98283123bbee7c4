//! Error types for `stockpipe-core`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
  #[error("invalid ticker symbol: {0:?}")]
  InvalidSymbol(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
