//! SQL schema for the stockpipe SQLite store.
//!
//! Connection pragmas run on every open; the table DDL runs when the loader
//! asks for it via `ensure_schema`.

/// Name of the raw, append-only price table.
pub const PRICE_TABLE: &str = "daily_stock_prices";

/// Per-connection settings.
pub const PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA busy_timeout = 5000;
";

/// Raw table DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
-- Rows are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table; each load run adds
-- a new batch and history is read back through batch_id.
CREATE TABLE IF NOT EXISTS daily_stock_prices (
    date      TEXT    NOT NULL,   -- YYYY-MM-DD trading day
    symbol    TEXT    NOT NULL,
    open      REAL    NOT NULL,
    high      REAL    NOT NULL,
    low       REAL    NOT NULL,
    close     REAL    NOT NULL,
    volume    INTEGER NOT NULL,
    batch_id  TEXT    NOT NULL,   -- load time, %Y%m%d_%H%M%S[_N]
    PRIMARY KEY (date, symbol, batch_id)
);

CREATE INDEX IF NOT EXISTS daily_stock_prices_batch_idx ON daily_stock_prices(batch_id);

PRAGMA user_version = 1;
";
