//! The transform stage: run a `;`-separated SQL script statement by
//! statement.
//!
//! Each statement commits on its own. A failing statement is recorded and
//! the runner moves on, so a later `CREATE VIEW` is never blocked by an
//! earlier statement that fails against the current schema. The stage itself
//! cannot fail.
//!
//! Statements are found by splitting on every `;`. A `;` inside a string
//! literal or a trigger body is not understood and will split the statement.

use std::{borrow::Cow, path::PathBuf};

use stockpipe_core::store::PriceStore;

use crate::opener::StoreOpener;

/// The script shipped with the binary.
pub const BUNDLED_SCRIPT: &str = include_str!("../sql/transformations.sql");

/// Characters of a statement kept in logs and summaries.
const FRAGMENT_LEN: usize = 50;

// ─── Script source ────────────────────────────────────────────────────────────

/// Where the transformation script comes from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
  Bundled,
  File(PathBuf),
}

impl ScriptSource {
  pub fn read(&self) -> std::io::Result<Cow<'static, str>> {
    match self {
      ScriptSource::Bundled => Ok(Cow::Borrowed(BUNDLED_SCRIPT)),
      ScriptSource::File(path) => std::fs::read_to_string(path).map(Cow::Owned),
    }
  }
}

// ─── Summary ──────────────────────────────────────────────────────────────────

/// Result of one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatementOutcome {
  /// Position among the non-blank statements, from 0.
  pub index:    usize,
  /// Leading fragment of the statement text.
  pub fragment: String,
  /// `None` on success.
  pub error:    Option<String>,
}

impl StatementOutcome {
  pub fn succeeded(&self) -> bool { self.error.is_none() }
}

/// Per-statement outcomes of one transform run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSummary {
  pub statements:   Vec<StatementOutcome>,
  /// Set when the script could not be read; no statement ran.
  pub script_error: Option<String>,
}

impl TransformSummary {
  pub fn succeeded(&self) -> usize { self.statements.iter().filter(|s| s.succeeded()).count() }

  pub fn failed(&self) -> usize { self.statements.len() - self.succeeded() }

  pub fn failures(&self) -> impl Iterator<Item = &StatementOutcome> {
    self.statements.iter().filter(|s| !s.succeeded())
  }
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// Split `script` on `;` into trimmed, non-blank statements, in order.
pub fn split_statements(script: &str) -> Vec<&str> {
  script
    .split(';')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .collect()
}

/// The first [`FRAGMENT_LEN`] characters of `statement` with whitespace runs
/// collapsed, followed by `...` if anything was cut.
pub fn fragment(statement: &str) -> String {
  let flat = statement.split_whitespace().collect::<Vec<_>>().join(" ");
  if flat.chars().count() <= FRAGMENT_LEN {
    return flat;
  }
  let mut cut: String = flat.chars().take(FRAGMENT_LEN).collect();
  cut.push_str("...");
  cut
}

// ─── Runner ───────────────────────────────────────────────────────────────────

/// Executes transformation scripts against the store.
pub struct TransformRunner<O> {
  opener: O,
}

impl<O: StoreOpener> TransformRunner<O> {
  pub fn new(opener: O) -> Self { Self { opener } }

  /// Read the script from `source` and run it. An unreadable script is
  /// reported in the summary.
  pub async fn run_source(&self, source: &ScriptSource) -> TransformSummary {
    match source.read() {
      Ok(script) => self.run_transformations(&script).await,
      Err(e) => {
        let message = format!("failed to read transform script {source:?}: {e}");
        tracing::error!("{message}");
        TransformSummary { statements: Vec::new(), script_error: Some(message) }
      }
    }
  }

  /// Execute every statement of `script` in order and report each outcome.
  ///
  /// If the store cannot be opened, every statement is recorded as failed
  /// with that error.
  pub async fn run_transformations(&self, script: &str) -> TransformSummary {
    let statements = split_statements(script);
    tracing::info!(statements = statements.len(), "running transformations");

    let store = match self.opener.open().await {
      Ok(store) => store,
      Err(e) => {
        let message = format!("store unavailable: {e}");
        tracing::error!(error = %e, "cannot open store for transformations");
        let outcomes = statements
          .iter()
          .enumerate()
          .map(|(index, stmt)| StatementOutcome {
            index,
            fragment: fragment(stmt),
            error: Some(message.clone()),
          })
          .collect();
        return TransformSummary { statements: outcomes, script_error: None };
      }
    };

    let mut outcomes = Vec::with_capacity(statements.len());
    for (index, stmt) in statements.into_iter().enumerate() {
      let fragment = fragment(stmt);
      let error = match store.execute_statement(stmt.to_owned()).await {
        Ok(()) => {
          tracing::debug!(index, statement = %fragment, "executed");
          None
        }
        Err(e) => {
          tracing::warn!(index, statement = %fragment, error = %e, "statement failed; continuing");
          Some(e.to_string())
        }
      };
      outcomes.push(StatementOutcome { index, fragment, error });
    }

    let summary = TransformSummary { statements: outcomes, script_error: None };
    tracing::info!(
      succeeded = summary.succeeded(),
      failed = summary.failed(),
      "transformations finished"
    );
    summary
  }
}
