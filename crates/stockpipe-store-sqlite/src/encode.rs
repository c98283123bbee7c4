//! Encoding helpers between domain types and the plain representations
//! stored in SQLite columns.
//!
//! Dates are stored as `YYYY-MM-DD` text so lexical order matches calendar
//! order. Prices are `REAL`, volumes signed `INTEGER`.

use chrono::NaiveDate;
use rusqlite::types::ValueRef;
use stockpipe_core::{
  batch::BatchId,
  record::PriceRecord,
  store::RelationKind,
};

use crate::{Error, Result};

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

// ─── Volume ──────────────────────────────────────────────────────────────────

pub fn encode_volume(v: u64) -> Result<i64> {
  i64::try_from(v).map_err(|_| Error::VolumeOverflow(v))
}

// ─── RelationKind ────────────────────────────────────────────────────────────

pub fn decode_relation_kind(s: &str) -> Result<RelationKind> {
  match s {
    "table" => Ok(RelationKind::Table),
    "view" => Ok(RelationKind::View),
    other => Err(Error::UnknownRelationKind(other.to_owned())),
  }
}

// ─── Query cells ─────────────────────────────────────────────────────────────

/// Render one result cell as display text.
pub fn render_value(v: ValueRef<'_>) -> String {
  match v {
    ValueRef::Null => "NULL".to_owned(),
    ValueRef::Integer(i) => i.to_string(),
    ValueRef::Real(f) => f.to_string(),
    ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
    ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A [`PriceRecord`] flattened into column values, ready to move onto the
/// database thread.
pub struct RawPriceRow {
  pub date:     String,
  pub symbol:   String,
  pub open:     f64,
  pub high:     f64,
  pub low:      f64,
  pub close:    f64,
  pub volume:   i64,
  pub batch_id: String,
}

impl RawPriceRow {
  pub fn encode(record: &PriceRecord, batch_id: &BatchId) -> Result<Self> {
    Ok(Self {
      date:     encode_date(record.date),
      symbol:   record.symbol.as_str().to_owned(),
      open:     record.open,
      high:     record.high,
      low:      record.low,
      close:    record.close,
      volume:   encode_volume(record.volume)?,
      batch_id: batch_id.as_str().to_owned(),
    })
  }
}

/// A `(name, type)` pair read from `sqlite_master`.
pub struct RawRelation {
  pub name: String,
  pub kind: String,
}

impl RawRelation {
  pub fn into_relation(self) -> Result<stockpipe_core::store::Relation> {
    Ok(stockpipe_core::store::Relation {
      name: self.name,
      kind: decode_relation_kind(&self.kind)?,
    })
  }
}
