//! Error types for the quote client.
//!
//! These cover client construction only. Per-symbol failures are
//! [`stockpipe_core::fetch::FetchError`]s.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("no quote API key configured (set quote_api.api_key or ALPHA_VANTAGE_API_KEY)")]
  MissingApiKey,

  #[error("failed to build HTTP client: {0}")]
  Http(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
