//! Ticker symbols.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A validated, upper-cased ticker symbol such as `MSFT` or `BRK.B`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
  /// Parse a ticker, trimming surrounding whitespace.
  ///
  /// Accepts ASCII alphanumerics plus `.`, `-`, `^` and `=`, which covers
  /// share classes, indices and FX pairs as the quote API spells them.
  pub fn parse(raw: &str) -> Result<Self> {
    let trimmed = raw.trim();
    let valid = !trimmed.is_empty()
      && trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));

    if !valid {
      return Err(Error::InvalidSymbol(raw.to_owned()));
    }
    Ok(Self(trimmed.to_ascii_uppercase()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for Symbol {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for Symbol {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<Symbol> for String {
  fn from(s: Symbol) -> Self { s.0 }
}
