//! One ingestion attempt over a bounded ledger range
//!
//! Phases run strictly in order: clear (optional), stream & transform,
//! flush, commit cursor. A failure stops the run where it is and the cursor
//! marker is left untouched, so the next attempt replays the range.
//!
//! When the upstream read fails partway, the ledgers already transformed are
//! complete and get flushed before the error is returned. A destination
//! failure flushes nothing further.

use super::asset_stats::AssetStats;
use super::cursor::Cursor;
use super::ingestion::Ingestion;
use super::system::RunPermit;
use super::{transform, upstream};
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::ledger::LedgerBundle;
use crate::metrics::{record_ledgers_ingested, IngesterMetrics};
use rusqlite::Connection;
use std::sync::Arc;

/// Outcome of `Session::run`.
#[derive(Debug, Default)]
pub struct SessionReport {
    pub first: u32,
    pub last: u32,
    /// Ledgers whose rows are durably written.
    pub ingested: u32,
    pub cleared_rows: usize,
    pub rows_written: usize,
    pub asset_stats_written: usize,
    pub cursor_committed: bool,
    err: Option<IngestError>,
    read_err: Option<IngestError>,
}

impl SessionReport {
    pub fn err(&self) -> Option<&IngestError> {
        self.err.as_ref()
    }

    /// Upstream read failure that ended the stream when a later failure
    /// became the reported `err()`.
    pub fn read_err(&self) -> Option<&IngestError> {
        self.read_err.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.err.is_none()
    }

    pub fn into_result(mut self) -> Result<Self> {
        match self.err.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

pub struct Session {
    _permit: RunPermit,
    cursor: Cursor,
    ingestion: Ingestion,
    asset_stats: AssetStats,
    metrics: Arc<IngesterMetrics>,

    ingest_failed_transactions: bool,
    clear_existing: bool,
    skip_cursor_update: bool,

    processed: u32,
    report: SessionReport,
}

impl Session {
    pub(crate) fn new(
        permit: RunPermit,
        config: &IngestConfig,
        core: Connection,
        history: Connection,
        first: u32,
        last: u32,
        metrics: Arc<IngesterMetrics>,
    ) -> Result<Self> {
        let cursor = Cursor::new(core, first, last, config.cursor_name.as_str(), Arc::clone(&metrics))?;

        Ok(Self {
            _permit: permit,
            cursor,
            ingestion: Ingestion::new(history),
            asset_stats: AssetStats::new(config.enable_asset_stats),
            metrics,
            ingest_failed_transactions: config.ingest_failed_transactions,
            clear_existing: config.clear_existing,
            skip_cursor_update: config.skip_cursor_update,
            processed: 0,
            report: SessionReport {
                first,
                last,
                ..Default::default()
            },
        })
    }

    /// Delete existing rows for the range before ingesting it.
    pub fn clear_existing(mut self, clear: bool) -> Self {
        self.clear_existing = clear;
        self
    }

    /// Leave the upstream cursor marker where it is.
    pub fn skip_cursor_update(mut self, skip: bool) -> Self {
        self.skip_cursor_update = skip;
        self
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Run every phase. Consumes the session and releases the run lock.
    pub fn run(mut self) -> SessionReport {
        log::info!(
            "🚀 Ingesting ledgers {}..={} (cursor {}, clear: {})",
            self.report.first,
            self.report.last,
            self.cursor.name(),
            self.clear_existing
        );

        match self.run_phases() {
            Ok(()) => log::info!(
                "✅ Ingested {} ledgers ({} rows, {} asset stats)",
                self.report.ingested,
                self.report.rows_written,
                self.report.asset_stats_written
            ),
            Err(e) => {
                log::error!("❌ Ingestion failed at {}: {}", self.cursor.position(), e);
                self.report.err = Some(e);
            }
        }

        self.report
    }

    fn run_phases(&mut self) -> Result<()> {
        if self.clear_existing {
            self.clear()?;
        }

        {
            let metrics = Arc::clone(&self.metrics);
            let _timer = metrics.ingest_ledger.start();
            self.stream()?;
        }

        let read_failure = self.cursor.take_err();
        if let Err(e) = self.flush() {
            if let Some(read) = read_failure {
                log::error!("❌ Flush failed after upstream read failure: {}", read);
                self.report.read_err = Some(read);
            }
            return Err(e);
        }
        if let Some(e) = read_failure {
            return Err(e);
        }

        self.commit_cursor()
    }

    fn clear(&mut self) -> Result<()> {
        let _timer = self.metrics.clear_ledger.start();
        self.report.cleared_rows = self.ingestion.clear(self.report.first, self.report.last)?;
        log::info!(
            "🧹 Cleared {} rows for ledgers {}..={}",
            self.report.cleared_rows,
            self.report.first,
            self.report.last
        );
        Ok(())
    }

    /// Transform ledgers until the range ends or the cursor fails.
    /// Read failures stay on the cursor; only transform failures return here.
    fn stream(&mut self) -> Result<()> {
        while self.cursor.next_ledger() {
            let Some(bundle) = self.cursor.bundle() else {
                break;
            };
            self.ingest_ledger(&bundle)?;
            self.processed += 1;
            log::debug!(
                "   ├─ Ledger {}: {} txs, {} rows buffered",
                bundle.sequence,
                bundle.transactions.len(),
                self.ingestion.pending_rows()
            );
        }
        Ok(())
    }

    fn ingest_ledger(&mut self, bundle: &LedgerBundle) -> Result<()> {
        let closed_at = bundle.header.closed_at();
        self.ingestion.ledger(bundle)?;

        while self.cursor.next_tx() {
            let Some(tx) = self
                .cursor
                .position()
                .transaction
                .and_then(|order| bundle.transactions.get(order as usize - 1))
            else {
                break;
            };

            if !tx.successful() && !self.ingest_failed_transactions {
                continue;
            }

            transform::transaction(&mut self.ingestion, bundle, tx)?;

            while self.cursor.next_op() {
                let Some(index) = self.cursor.operation_index() else {
                    break;
                };
                transform::operation(&mut self.ingestion, &mut self.asset_stats, &closed_at, tx, index)?;
            }
        }

        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.report.rows_written = self.ingestion.flush()?;
        self.report.asset_stats_written = self
            .asset_stats
            .update_and_flush(self.cursor.connection(), self.ingestion.connection_mut())?;

        self.report.ingested = self.processed;
        record_ledgers_ingested(self.processed as u64);
        Ok(())
    }

    fn commit_cursor(&mut self) -> Result<()> {
        if self.skip_cursor_update {
            log::info!("⏭️  Cursor update skipped");
            return Ok(());
        }
        let Some(ledger) = self.cursor.current_ledger() else {
            return Ok(());
        };

        upstream::set_cursor(self.cursor.connection(), self.cursor.name(), ledger)?;
        self.report.cursor_committed = true;
        log::info!("📌 Cursor {} advanced to {}", self.cursor.name(), ledger);
        Ok(())
    }
}
