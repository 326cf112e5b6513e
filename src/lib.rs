//! # ledger-ingest
//!
//! Incremental, resumable ingestion of closed ledgers from an upstream core
//! store into a queryable history store.
//!
//! See `ingest` for the engine, `pipeline` for the staged executor adapters.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod sqlite_pragma;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use ingest::{Session, SessionReport, System};
