//! Translation of an Alpha Vantage `TIME_SERIES_DAILY` body into
//! [`PriceRecord`]s. Pure; no I/O.
//!
//! A successful body looks like:
//!
//! ```json
//! {
//!   "Meta Data": { "2. Symbol": "MSFT", ... },
//!   "Time Series (Daily)": {
//!     "2025-04-01": {
//!       "1. open": "382.06", "2. high": "385.53", "3. low": "380.01",
//!       "4. close": "382.19", "5. volume": "17504365"
//!     }
//!   }
//! }
//! ```
//!
//! Errors and throttling come back with HTTP 200 and a single `Error Message`,
//! `Note` or `Information` key instead of the series.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use stockpipe_core::{fetch::FetchError, record::PriceRecord, symbol::Symbol};

/// Key holding the per-date series.
pub const SERIES_KEY: &str = "Time Series (Daily)";

/// Payload keys the provider uses to report a refused request.
const REJECTION_KEYS: [&str; 3] = ["Error Message", "Note", "Information"];

const OPEN: &str = "1. open";
const HIGH: &str = "2. high";
const LOW: &str = "3. low";
const CLOSE: &str = "4. close";
const VOLUME: &str = "5. volume";

/// Records decoded from one response, plus the per-record failures that were
/// dropped along the way.
#[derive(Debug, Default)]
pub struct ParsedSeries {
  /// Sorted by date, oldest first.
  pub records:   Vec<PriceRecord>,
  /// One [`FetchError::MalformedRecord`] per dropped date.
  pub malformed: Vec<FetchError>,
}

/// Decode a response body for `symbol`.
///
/// Returns `ProviderRejected` for an error payload and `NoData` when the
/// series is absent or empty. A record that fails to parse is reported in
/// [`ParsedSeries::malformed`] and does not affect its siblings.
pub fn parse_daily_series(symbol: &Symbol, body: &Value) -> Result<ParsedSeries, FetchError> {
  if let Some(message) = rejection_message(body) {
    return Err(FetchError::ProviderRejected(message));
  }

  let series = match body.get(SERIES_KEY).and_then(Value::as_object) {
    Some(s) if !s.is_empty() => s,
    _ => return Err(FetchError::NoData),
  };

  let mut parsed = ParsedSeries::default();
  for (date, fields) in series {
    match parse_record(symbol, date, fields) {
      Ok(record) => parsed.records.push(record),
      Err(reason) => parsed.malformed.push(FetchError::MalformedRecord {
        date: date.clone(),
        reason,
      }),
    }
  }
  parsed.records.sort_by_key(|r| r.date);

  Ok(parsed)
}

fn rejection_message(body: &Value) -> Option<String> {
  REJECTION_KEYS.iter().find_map(|key| {
    body.get(*key).map(|v| match v.as_str() {
      Some(s) => s.to_owned(),
      None => v.to_string(),
    })
  })
}

fn parse_record(symbol: &Symbol, date: &str, fields: &Value) -> Result<PriceRecord, String> {
  let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
    .map_err(|e| format!("invalid date {date:?}: {e}"))?;
  let fields = fields
    .as_object()
    .ok_or_else(|| "record is not an object".to_owned())?;

  Ok(PriceRecord {
    date,
    symbol: symbol.clone(),
    open: price(fields, OPEN)?,
    high: price(fields, HIGH)?,
    low: price(fields, LOW)?,
    close: price(fields, CLOSE)?,
    volume: volume(fields)?,
  })
}

fn field<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
  fields
    .get(key)
    .ok_or_else(|| format!("missing field {key:?}"))?
    .as_str()
    .map(str::trim)
    .ok_or_else(|| format!("field {key:?} is not a string"))
}

fn price(fields: &Map<String, Value>, key: &str) -> Result<f64, String> {
  let raw = field(fields, key)?;
  let value: f64 = raw
    .parse()
    .map_err(|_| format!("field {key:?} is not a number: {raw:?}"))?;
  if !value.is_finite() || value < 0.0 {
    return Err(format!("field {key:?} is out of range: {raw:?}"));
  }
  Ok(value)
}

fn volume(fields: &Map<String, Value>) -> Result<u64, String> {
  let raw = field(fields, VOLUME)?;
  let value: u64 = raw
    .parse()
    .map_err(|_| format!("field {VOLUME:?} is not a non-negative integer: {raw:?}"))?;
  // Stored as a signed 64-bit integer downstream.
  if value > i64::MAX as u64 {
    return Err(format!("field {VOLUME:?} is out of range: {raw:?}"));
  }
  Ok(value)
}
