//! The stockpipe daily price pipeline.
//!
//! Three stages run in order: [`extract`] fetches each configured symbol and
//! stages a CSV artifact, [`load`] appends that artifact to the store as a new
//! batch, and [`transform`] runs a SQL script that rebuilds the derived views.
//! [`orchestrator`] sequences them; the `stockpipe` binary exposes each stage
//! and the full run on the command line.

pub mod config;
pub mod error;
pub mod extract;
pub mod load;
pub mod opener;
pub mod orchestrator;
pub mod staging;
pub mod transform;

pub use config::PipelineConfig;
pub use error::{ConfigError, ExtractError, LoadError, StagingError};
pub use orchestrator::{CancelHandle, Orchestrator, PipelineState, RunReport, Stage};

#[cfg(test)]
mod tests;
