//! Alpha Vantage daily quote client for stockpipe.
//!
//! [`AlphaVantageClient`] implements [`QuoteFetcher`]: one HTTP request per
//! symbol, translated into [`PriceRecord`]s by [`parse::parse_daily_series`].
//! The client never retries; that is the scheduler's job.

pub mod error;
pub mod parse;

use std::time::Duration;

use serde::Deserialize;
use stockpipe_core::{
  fetch::{FetchError, QuoteFetcher},
  record::PriceRecord,
  symbol::Symbol,
};

pub use error::{Error, Result};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Size of the window the provider returns per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputSize {
  /// The latest 100 trading days.
  #[default]
  Compact,
  /// The full available history.
  Full,
}

impl OutputSize {
  pub fn as_str(self) -> &'static str {
    match self {
      OutputSize::Compact => "compact",
      OutputSize::Full => "full",
    }
  }
}

/// Connection settings for the quote API, deserialised from the `quote_api`
/// config table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuoteApiConfig {
  pub base_url:     String,
  /// Never logged.
  pub api_key:      Option<String>,
  pub output_size:  OutputSize,
  /// Per-request timeout; an elapsed timeout is a [`FetchError::Timeout`].
  pub timeout_secs: u64,
}

impl Default for QuoteApiConfig {
  fn default() -> Self {
    Self {
      base_url:     "https://www.alphavantage.co/query".to_string(),
      api_key:      None,
      output_size:  OutputSize::Compact,
      timeout_secs: 30,
    }
  }
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// HTTP client for the `TIME_SERIES_DAILY` endpoint.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct AlphaVantageClient {
  http:        reqwest::Client,
  base_url:    String,
  api_key:     String,
  output_size: OutputSize,
}

impl AlphaVantageClient {
  /// Build a client; fails if no API key is configured.
  pub fn new(config: &QuoteApiConfig) -> Result<Self> {
    let api_key = config
      .api_key
      .as_deref()
      .map(str::trim)
      .filter(|k| !k.is_empty())
      .ok_or(Error::MissingApiKey)?
      .to_owned();

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()?;

    Ok(Self {
      http,
      base_url: config.base_url.clone(),
      api_key,
      output_size: config.output_size,
    })
  }
}

impl QuoteFetcher for AlphaVantageClient {
  async fn fetch<'a>(&'a self, symbol: &'a Symbol) -> Result<Vec<PriceRecord>, FetchError> {
    let resp = self
      .http
      .get(&self.base_url)
      .query(&[
        ("function", "TIME_SERIES_DAILY"),
        ("symbol", symbol.as_str()),
        ("outputsize", self.output_size.as_str()),
        ("apikey", self.api_key.as_str()),
      ])
      .send()
      .await
      .map_err(transport_error)?;

    let status = resp.status();
    if !status.is_success() {
      return Err(FetchError::Transport(format!("HTTP {status}")));
    }

    let body: serde_json::Value = resp.json().await.map_err(transport_error)?;
    let parsed = parse::parse_daily_series(symbol, &body)?;

    for dropped in &parsed.malformed {
      tracing::warn!(%symbol, error = %dropped, "dropping malformed record");
    }
    if parsed.records.is_empty() {
      return Err(FetchError::NoData);
    }

    tracing::debug!(%symbol, records = parsed.records.len(), "fetched daily series");
    Ok(parsed.records)
  }
}

/// Map a reqwest failure, stripping the URL so the API key never reaches a
/// log line.
fn transport_error(e: reqwest::Error) -> FetchError {
  if e.is_timeout() {
    FetchError::Timeout
  } else {
    FetchError::Transport(e.without_url().to_string())
  }
}
