//! Pipeline configuration.
//!
//! Layered with the `config` crate: an optional TOML file, then `STOCKPIPE_*`
//! environment variables (`__` separates nested keys, e.g.
//! `STOCKPIPE_QUOTE_API__API_KEY`). Every stage receives its settings from a
//! [`PipelineConfig`] value; nothing is read from process-wide state after
//! startup.

use std::path::{Path, PathBuf};

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use stockpipe_core::symbol::Symbol;
use stockpipe_quotes::QuoteApiConfig;

use crate::{error::ConfigError, staging::Staging, transform::ScriptSource};

/// Environment variable consulted when `quote_api.api_key` is unset.
pub const API_KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";

// ─── Types ────────────────────────────────────────────────────────────────────

/// Retry policy applied by the `run` command when a run ends in `Failed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
  /// Extra attempts after the first failed run.
  pub retries:          u32,
  pub retry_delay_secs: u64,
}

impl Default for ScheduleConfig {
  fn default() -> Self { Self { retries: 1, retry_delay_secs: 300 } }
}

/// Runtime pipeline configuration, deserialised from `stockpipe.toml` and the
/// environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  pub symbols:          Vec<String>,
  pub store_path:       PathBuf,
  pub staging_dir:      PathBuf,
  /// Overrides the bundled transformation script.
  pub transform_script: Option<PathBuf>,
  pub quote_api:        QuoteApiConfig,
  pub schedule:         ScheduleConfig,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      symbols:          ["MSFT", "AAPL", "GOOGL", "AMZN", "META"]
        .map(str::to_owned)
        .to_vec(),
      store_path:       PathBuf::from("data/stock_data.db"),
      staging_dir:      PathBuf::from("data"),
      transform_script: None,
      quote_api:        QuoteApiConfig::default(),
      schedule:         ScheduleConfig::default(),
    }
  }
}

// ─── Loading ──────────────────────────────────────────────────────────────────

impl PipelineConfig {
  /// Read `path` (if it exists) and the environment.
  ///
  /// Falls back to [`API_KEY_ENV`] for the quote API key.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let builder = Config::builder()
      .add_source(File::from(path).format(FileFormat::Toml).required(false))
      .add_source(
        Environment::with_prefix("STOCKPIPE")
          .prefix_separator("_")
          .separator("__")
          .list_separator(",")
          .with_list_parse_key("symbols")
          .try_parsing(true),
      );

    let mut cfg = Self::from_builder(builder)?;
    if cfg.quote_api.api_key.is_none() {
      cfg.quote_api.api_key = std::env::var(API_KEY_ENV).ok();
    }
    Ok(cfg)
  }

  /// Parse a TOML document on its own, without the environment layer.
  pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
    Self::from_builder(Config::builder().add_source(File::from_str(toml, FileFormat::Toml)))
  }

  fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
    let mut cfg: Self = builder.build()?.try_deserialize()?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    cfg.staging_dir = expand_tilde(&cfg.staging_dir);
    cfg.transform_script = cfg.transform_script.as_deref().map(expand_tilde);
    Ok(cfg)
  }

  // ── Derived settings ──────────────────────────────────────────────────────

  /// The validated symbol set: at least one entry, every entry a valid
  /// ticker, duplicates removed keeping first occurrence.
  pub fn symbols(&self) -> Result<Vec<Symbol>, ConfigError> {
    let mut out: Vec<Symbol> = Vec::with_capacity(self.symbols.len());
    for raw in &self.symbols {
      let symbol = Symbol::parse(raw)?;
      if !out.contains(&symbol) {
        out.push(symbol);
      }
    }
    if out.is_empty() {
      return Err(ConfigError::NoSymbols);
    }
    Ok(out)
  }

  pub fn staging(&self) -> Staging { Staging::new(&self.staging_dir) }

  /// Where the transform stage reads its script from.
  pub fn script_source(&self) -> Result<ScriptSource, ConfigError> {
    match &self.transform_script {
      None => Ok(ScriptSource::Bundled),
      Some(path) if path.is_file() => Ok(ScriptSource::File(path.clone())),
      Some(path) => Err(ConfigError::ScriptMissing(path.clone())),
    }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use stockpipe_quotes::OutputSize;

  use super::*;

  #[test]
  fn empty_document_uses_defaults() {
    let cfg = PipelineConfig::from_toml("").unwrap();
    assert_eq!(cfg.symbols, ["MSFT", "AAPL", "GOOGL", "AMZN", "META"]);
    assert_eq!(cfg.store_path, PathBuf::from("data/stock_data.db"));
    assert_eq!(cfg.staging_dir, PathBuf::from("data"));
    assert_eq!(cfg.quote_api.output_size, OutputSize::Compact);
    assert_eq!(cfg.quote_api.timeout_secs, 30);
    assert_eq!(cfg.schedule.retries, 1);
    assert_eq!(cfg.schedule.retry_delay_secs, 300);
    assert!(matches!(cfg.script_source().unwrap(), ScriptSource::Bundled));
  }

  #[test]
  fn nested_tables_override_defaults() {
    let cfg = PipelineConfig::from_toml(
      r#"
      symbols     = ["aaa", "BBB"]
      store_path  = "/tmp/prices.db"

      [quote_api]
      api_key     = "demo"
      output_size = "full"

      [schedule]
      retries     = 3
      "#,
    )
    .unwrap();

    assert_eq!(cfg.quote_api.api_key.as_deref(), Some("demo"));
    assert_eq!(cfg.quote_api.output_size, OutputSize::Full);
    assert_eq!(cfg.schedule.retries, 3);
    assert_eq!(cfg.schedule.retry_delay_secs, 300);
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/prices.db"));

    let symbols: Vec<String> = cfg
      .symbols()
      .unwrap()
      .into_iter()
      .map(String::from)
      .collect();
    assert_eq!(symbols, ["AAA", "BBB"]);
  }

  #[test]
  fn symbols_are_deduplicated_in_order() {
    let cfg = PipelineConfig {
      symbols: vec!["msft".into(), "AAPL".into(), "MSFT".into()],
      ..Default::default()
    };
    let symbols: Vec<String> = cfg.symbols().unwrap().into_iter().map(String::from).collect();
    assert_eq!(symbols, ["MSFT", "AAPL"]);
  }

  #[test]
  fn empty_or_invalid_symbols_are_rejected() {
    let cfg = PipelineConfig { symbols: vec![], ..Default::default() };
    assert!(matches!(cfg.symbols(), Err(ConfigError::NoSymbols)));

    let cfg = PipelineConfig { symbols: vec!["MS FT".into()], ..Default::default() };
    assert!(matches!(cfg.symbols(), Err(ConfigError::InvalidSymbol(_))));
  }

  #[test]
  fn missing_script_file_is_a_config_error() {
    let cfg = PipelineConfig {
      transform_script: Some(PathBuf::from("/definitely/not/here.sql")),
      ..Default::default()
    };
    assert!(matches!(cfg.script_source(), Err(ConfigError::ScriptMissing(_))));
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/x.db")), PathBuf::from(home).join("x.db"));
    assert_eq!(expand_tilde(Path::new("/abs/x.db")), PathBuf::from("/abs/x.db"));
  }
}
