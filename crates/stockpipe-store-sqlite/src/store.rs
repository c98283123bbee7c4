//! [`SqliteStore`], the SQLite implementation of [`PriceStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use stockpipe_core::{
  batch::{BatchId, BatchInfo},
  record::PriceRecord,
  store::{PriceStore, QueryOutput, Relation},
};

use crate::{
  encode::{RawPriceRow, RawRelation, render_value},
  schema::{PRAGMAS, SCHEMA},
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A historized price store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and apply connection pragmas.
  ///
  /// The price table is not created here; see [`PriceStore::ensure_schema`].
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.apply_pragmas().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.apply_pragmas().await?;
    Ok(store)
  }

  async fn apply_pragmas(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── PriceStore impl ─────────────────────────────────────────────────────────

impl PriceStore for SqliteStore {
  type Error = crate::Error;

  async fn ensure_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Batches: append-only writes ───────────────────────────────────────────

  async fn batch_exists(&self, batch_id: BatchId) -> Result<bool> {
    let id_str = batch_id.as_str().to_owned();

    let exists = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT 1 FROM daily_stock_prices WHERE batch_id = ?1 LIMIT 1",
              rusqlite::params![id_str],
              |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false),
        )
      })
      .await?;

    Ok(exists)
  }

  async fn append_batch(&self, batch_id: BatchId, records: Vec<PriceRecord>) -> Result<usize> {
    let rows: Vec<RawPriceRow> = records
      .iter()
      .map(|r| RawPriceRow::encode(r, &batch_id))
      .collect::<Result<_>>()?;

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut written = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO daily_stock_prices (
               date, symbol, open, high, low, close, volume, batch_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          )?;
          for row in &rows {
            written += stmt.execute(rusqlite::params![
              row.date,
              row.symbol,
              row.open,
              row.high,
              row.low,
              row.close,
              row.volume,
              row.batch_id,
            ])?;
          }
        }
        tx.commit()?;
        Ok(written)
      })
      .await?;

    tracing::debug!(%batch_id, written, "appended batch");
    Ok(written)
  }

  async fn count_batch(&self, batch_id: BatchId) -> Result<u64> {
    let id_str = batch_id.as_str().to_owned();

    let count: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT COUNT(*) FROM daily_stock_prices WHERE batch_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?)
      })
      .await?;

    Ok(count.max(0) as u64)
  }

  async fn list_batches(&self) -> Result<Vec<BatchInfo>> {
    let raws: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT batch_id, COUNT(*)
           FROM daily_stock_prices
           GROUP BY batch_id
           ORDER BY batch_id",
        )?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(
      raws
        .into_iter()
        .map(|(id, n)| BatchInfo {
          batch_id:  BatchId::from_stored(id),
          row_count: n.max(0) as u64,
        })
        .collect(),
    )
  }

  // ── Transformations ───────────────────────────────────────────────────────

  async fn execute_statement(&self, sql: String) -> Result<()> {
    // Autocommit: the statement is its own transaction.
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn list_relations(&self) -> Result<Vec<Relation>> {
    let raws: Vec<RawRelation> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT name, type FROM sqlite_master
           WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
           ORDER BY name",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawRelation {
              name: row.get(0)?,
              kind: row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRelation::into_relation).collect()
  }

  async fn query(&self, sql: String) -> Result<QueryOutput> {
    let output = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> =
          stmt.column_names().into_iter().map(str::to_owned).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
          let mut cells = Vec::with_capacity(width);
          for i in 0..width {
            cells.push(render_value(row.get_ref(i)?));
          }
          rows.push(cells);
        }

        Ok(QueryOutput { columns, rows })
      })
      .await?;

    Ok(output)
  }
}
