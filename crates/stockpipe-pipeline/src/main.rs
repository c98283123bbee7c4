//! stockpipe command-line entry point.
//!
//! Reads `stockpipe.toml` (or the path given with `--config`) plus
//! `STOCKPIPE_*` environment variables, then runs one pipeline stage, the
//! full pipeline, or a read-only inspection of the store.
//!
//! Exit codes: 0 on success (including a run that found no data), 1 on a
//! configuration or setup error, 2 when extraction fails, 3 when loading
//! fails, 130 when interrupted.

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use stockpipe_core::store::{PriceStore, RelationKind};
use stockpipe_pipeline::{
  ExtractError, Orchestrator, PipelineConfig, RunReport,
  extract::{ExtractSummary, Extractor},
  load::Loader,
  opener::SqliteFile,
  orchestrator::{EXIT_EXTRACT_FAILED, EXIT_LOAD_FAILED},
  transform::{TransformRunner, TransformSummary},
};
use stockpipe_quotes::AlphaVantageClient;
use stockpipe_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Daily stock price pipeline")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "stockpipe.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Fetch every configured symbol and stage today's artifact.
  Extract,

  /// Append a staged artifact to the store as a new batch.
  Load {
    /// Artifact to load; defaults to today's staged file.
    #[arg(long)]
    artifact: Option<PathBuf>,
  },

  /// Run the transformation script against the store.
  Transform,

  /// Extract, load and transform in one go.
  Run {
    /// Extra attempts after a failed run.
    #[arg(long)]
    retries:     Option<u32>,
    /// Seconds to wait between attempts.
    #[arg(long)]
    retry_delay: Option<u64>,
  },

  /// List the tables and views in the store.
  Tables,

  /// List loaded batches with their row counts.
  Batches,

  /// Run an ad-hoc SQL query and print the rows tab-separated.
  Query {
    sql: String,
  },
}

#[tokio::main]
async fn main() -> ExitCode {
  // A missing .env file is fine.
  dotenvy::dotenv().ok();

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  match dispatch(cli).await {
    Ok(code) => ExitCode::from(code),
    Err(e) => {
      eprintln!("error: {e:#}");
      ExitCode::from(1)
    }
  }
}

async fn dispatch(cli: Cli) -> anyhow::Result<u8> {
  let cfg = PipelineConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

  match cli.command {
    Command::Extract => extract(&cfg).await,
    Command::Load { artifact } => load(&cfg, artifact).await,
    Command::Transform => transform(&cfg).await,
    Command::Run { retries, retry_delay } => run(&cfg, retries, retry_delay).await,
    Command::Tables => tables(&cfg).await,
    Command::Batches => batches(&cfg).await,
    Command::Query { sql } => query(&cfg, sql).await,
  }
}

// ─── Stage commands ───────────────────────────────────────────────────────────

async fn extract(cfg: &PipelineConfig) -> anyhow::Result<u8> {
  let symbols = cfg.symbols().context("invalid symbol configuration")?;
  let client = AlphaVantageClient::new(&cfg.quote_api).context("failed to build quote client")?;

  match Extractor::new(client, cfg.staging()).extract(&symbols).await {
    Ok(extraction) => {
      print_extract(&extraction.summary);
      Ok(0)
    }
    Err(ExtractError::EmptyResult) => {
      println!("extract: no symbol returned data; nothing staged");
      Ok(0)
    }
    Err(e) => {
      println!("extract: FAILED: {e}");
      Ok(EXIT_EXTRACT_FAILED)
    }
  }
}

async fn load(cfg: &PipelineConfig, artifact: Option<PathBuf>) -> anyhow::Result<u8> {
  let loader = Loader::new(SqliteFile::new(&cfg.store_path), cfg.staging());
  let result = match artifact {
    Some(path) => loader.load_from(&path).await,
    None => loader.load_latest().await,
  };

  match result {
    Ok(summary) => {
      println!("load: batch {} written, {} rows", summary.batch_id, summary.row_count);
      Ok(0)
    }
    Err(e) => {
      println!("load: FAILED: {e}");
      Ok(EXIT_LOAD_FAILED)
    }
  }
}

async fn transform(cfg: &PipelineConfig) -> anyhow::Result<u8> {
  let source = cfg.script_source()?;
  let summary = TransformRunner::new(SqliteFile::new(&cfg.store_path))
    .run_source(&source)
    .await;
  print_transform(&summary);
  Ok(0)
}

async fn run(cfg: &PipelineConfig, retries: Option<u32>, retry_delay: Option<u64>) -> anyhow::Result<u8> {
  let symbols = cfg.symbols().context("invalid symbol configuration")?;
  let script = cfg.script_source()?;
  let client = AlphaVantageClient::new(&cfg.quote_api).context("failed to build quote client")?;

  let retries = retries.unwrap_or(cfg.schedule.retries);
  let delay = Duration::from_secs(retry_delay.unwrap_or(cfg.schedule.retry_delay_secs));

  let orchestrator = Orchestrator::new(
    client,
    SqliteFile::new(&cfg.store_path),
    cfg.staging(),
    symbols,
    script,
  );

  let cancel = orchestrator.cancel_handle();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      tracing::warn!("interrupt received; stopping before the next stage");
      cancel.cancel();
    }
  });

  let report = orchestrator.run_with_retries(retries, delay).await;
  if report.attempts > 1 {
    println!("run: {} attempts", report.attempts);
  }
  print_report(&report);
  Ok(report.exit_code())
}

// ─── Inspection commands ──────────────────────────────────────────────────────

async fn open_store(cfg: &PipelineConfig) -> anyhow::Result<SqliteStore> {
  SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {}", cfg.store_path.display()))
}

async fn tables(cfg: &PipelineConfig) -> anyhow::Result<u8> {
  let store = open_store(cfg).await?;
  let relations = store.list_relations().await.context("failed to list relations")?;
  if relations.is_empty() {
    println!("(store is empty)");
  }
  for r in relations {
    let kind = match r.kind {
      RelationKind::Table => "table",
      RelationKind::View => "view",
    };
    println!("{kind:<6} {}", r.name);
  }
  Ok(0)
}

async fn batches(cfg: &PipelineConfig) -> anyhow::Result<u8> {
  let store = open_store(cfg).await?;
  store.ensure_schema().await.context("failed to initialise store")?;
  let batches = store.list_batches().await.context("failed to list batches")?;
  if batches.is_empty() {
    println!("(no batches loaded)");
  }
  for b in batches {
    println!("{}\t{}", b.batch_id, b.row_count);
  }
  Ok(0)
}

async fn query(cfg: &PipelineConfig, sql: String) -> anyhow::Result<u8> {
  let store = open_store(cfg).await?;
  let output = store.query(sql).await.context("query failed")?;
  println!("{}", output.columns.join("\t"));
  for row in &output.rows {
    println!("{}", row.join("\t"));
  }
  Ok(0)
}

// ─── Status lines ─────────────────────────────────────────────────────────────

fn print_extract(summary: &ExtractSummary) {
  println!(
    "extract: {} records from {} symbols staged at {}",
    summary.record_count,
    summary.fetched.len(),
    summary.path.display()
  );
  for skipped in &summary.skipped {
    println!("extract: skipped {}: {}", skipped.symbol, skipped.error);
  }
}

fn print_transform(summary: &TransformSummary) {
  if let Some(err) = &summary.script_error {
    println!("transform: script not run: {err}");
    return;
  }
  println!(
    "transform: {} statements succeeded, {} failed",
    summary.succeeded(),
    summary.failed()
  );
  for failure in summary.failures() {
    println!(
      "transform: statement {} failed: {} ({})",
      failure.index,
      failure.fragment,
      failure.error.as_deref().unwrap_or_default()
    );
  }
}

fn print_report(report: &RunReport) {
  if let Some(summary) = &report.extract {
    print_extract(summary);
  }
  if report.empty_result {
    println!("extract: no symbol returned data; load and transform skipped");
  }
  if let Some(summary) = &report.load {
    println!("load: batch {} written, {} rows", summary.batch_id, summary.row_count);
  }
  if let Some(summary) = &report.transform {
    print_transform(summary);
  }
  match &report.failure {
    Some(failure) => println!("run: {} ({failure})", report.state),
    None => println!("run: {}", report.state),
  }
}
