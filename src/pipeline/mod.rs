//! # Staged processing pipeline
//!
//! A small executor that drives items from one sequential reader through a
//! tree of processing stages, plus the adapters that plug ledger-domain
//! readers and processors into it.
//!
//! ```text
//! StateReader ──(blocking task)──▶ root stage ──▶ child stage
//!                                        └──────▶ child stage
//! ```
//!
//! Every stage runs as its own tokio task fed by a bounded channel, so a slow
//! stage applies back-pressure all the way to the reader. The first failure
//! wins: the failing stage drops its input, upstream senders observe the
//! closed channel and stop, and `PipelineHandle::wait` resolves to that error.
//!
//! ## Module Organization
//!
//! - `executor` - generic reader/processor traits, nodes, and the run handle
//! - `ledger` - `LedgerReader`/`LedgerProcessor` and their adapters

pub mod executor;
pub mod ledger;

pub use executor::{Pipeline, PipelineHandle, PipelineNode, StateProcessor, StateReader};
pub use ledger::{ledger_node, LedgerPipeline, LedgerProcessor, LedgerReader};
