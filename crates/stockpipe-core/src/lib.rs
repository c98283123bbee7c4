//! Core types and trait definitions for the stockpipe daily price pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies. The
//! quote client, the SQLite store and the pipeline stages all depend on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod batch;
pub mod error;
pub mod fetch;
pub mod record;
pub mod store;
pub mod symbol;

pub use error::{Error, Result};
