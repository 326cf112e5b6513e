//! Sequential reader over an upstream ledger range
//!
//! `next_ledger()` loads header, transactions and fees of the next ledger in
//! one step. `next_tx()` / `next_op()` then walk the loaded bundle so the
//! caller always has a precise in-progress position for diagnostics.
//! Resumption is range-granular and never uses that position.
//!
//! A failed load sets a terminal error; the cursor yields nothing further.

use super::upstream;
use crate::error::{IngestError, Result};
use crate::ledger::toid::{Toid, MAX_LEDGER};
use crate::ledger::{LedgerBundle, Operation, Transaction};
use crate::metrics::IngesterMetrics;
use crate::pipeline::LedgerReader;
use rusqlite::Connection;
use std::fmt;
use std::sync::Arc;

/// Where a cursor currently is: ledger, then 1-based tx and op orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub ledger: Option<u32>,
    pub transaction: Option<u32>,
    pub operation: Option<u32>,
}

impl fmt::Display for CursorPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ledger {
            None => write!(f, "not started"),
            Some(ledger) => {
                write!(f, "ledger {}", ledger)?;
                if let Some(tx) = self.transaction {
                    write!(f, " tx {}", tx)?;
                }
                if let Some(op) = self.operation {
                    write!(f, " op {}", op)?;
                }
                Ok(())
            }
        }
    }
}

pub struct Cursor {
    conn: Connection,
    first: u32,
    last: u32,
    name: String,
    metrics: Arc<IngesterMetrics>,

    lg: Option<u32>,
    tx: Option<usize>,
    op: Option<usize>,
    data: Option<Arc<LedgerBundle>>,
    done: bool,
    err: Option<IngestError>,
}

impl Cursor {
    pub fn new(
        conn: Connection,
        first: u32,
        last: u32,
        name: impl Into<String>,
        metrics: Arc<IngesterMetrics>,
    ) -> Result<Self> {
        if first > last {
            return Err(IngestError::InvalidRange { first, last });
        }
        if last > MAX_LEDGER {
            return Err(IngestError::IdOutOfRange {
                ledger: last,
                transaction: 0,
                operation: 0,
            });
        }

        Ok(Self {
            conn,
            first,
            last,
            name: name.into(),
            metrics,
            lg: None,
            tx: None,
            op: None,
            data: None,
            done: false,
            err: None,
        })
    }

    pub fn first(&self) -> u32 {
        self.first
    }

    pub fn last(&self) -> u32 {
        self.last
    }

    /// Identity of this ingester's position marker upstream.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Advance to the next ledger in the range.
    ///
    /// Returns `false` at end of range or after a load failure; check
    /// `err()` to tell the two apart.
    pub fn next_ledger(&mut self) -> bool {
        if self.done || self.err.is_some() {
            return false;
        }

        let sequence = match self.lg {
            None => self.first,
            Some(lg) if lg >= self.last => {
                self.finish();
                return false;
            }
            Some(lg) => lg + 1,
        };

        let loaded = {
            let _timer = self.metrics.load_ledger.start();
            upstream::load_bundle(&self.conn, sequence)
        };

        match loaded {
            Ok(bundle) => {
                log::debug!(
                    "📖 Loaded ledger {} ({} txs) for cursor {}",
                    sequence,
                    bundle.transactions.len(),
                    self.name
                );
                self.lg = Some(sequence);
                self.tx = None;
                self.op = None;
                self.data = Some(Arc::new(bundle));
                true
            }
            Err(e) => {
                log::error!("❌ Cursor {} failed to load ledger {}: {}", self.name, sequence, e);
                self.data = None;
                self.err = Some(e);
                false
            }
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.data = None;
        self.tx = None;
        self.op = None;
    }

    /// The bundle loaded by the last successful `next_ledger()`.
    pub fn bundle(&self) -> Option<Arc<LedgerBundle>> {
        self.data.clone()
    }

    /// Advance to the next transaction of the current ledger.
    pub fn next_tx(&mut self) -> bool {
        let Some(data) = &self.data else {
            return false;
        };
        let next = self.tx.map_or(0, |tx| tx + 1);
        if next >= data.transactions.len() {
            return false;
        }
        self.tx = Some(next);
        self.op = None;
        true
    }

    /// Advance to the next operation of the current transaction.
    pub fn next_op(&mut self) -> bool {
        let Some(tx) = self.transaction() else {
            return false;
        };
        let count = tx.envelope.operations.len();
        let next = self.op.map_or(0, |op| op + 1);
        if next >= count {
            return false;
        }
        self.op = Some(next);
        true
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.data.as_ref()?.transactions.get(self.tx?)
    }

    pub fn operation(&self) -> Option<&Operation> {
        self.transaction()?.envelope.operations.get(self.op?)
    }

    /// 0-based index of the current operation in its transaction.
    pub fn operation_index(&self) -> Option<usize> {
        self.op
    }

    pub fn position(&self) -> CursorPosition {
        CursorPosition {
            ledger: self.lg,
            transaction: self.tx.map(|tx| tx as u32 + 1),
            operation: self.op.map(|op| op as u32 + 1),
        }
    }

    pub fn transaction_id(&self) -> Option<i64> {
        let position = self.position();
        Some(Toid::new(position.ledger?, position.transaction?, 0).to_i64())
    }

    pub fn operation_id(&self) -> Option<i64> {
        let position = self.position();
        Some(Toid::new(position.ledger?, position.transaction?, position.operation?).to_i64())
    }

    /// Last ledger loaded successfully, if any.
    pub fn current_ledger(&self) -> Option<u32> {
        self.lg
    }

    pub fn err(&self) -> Option<&IngestError> {
        self.err.as_ref()
    }

    pub fn take_err(&mut self) -> Option<IngestError> {
        let err = self.err.take();
        if err.is_some() {
            self.done = true;
        }
        err
    }
}

impl LedgerReader for Cursor {
    fn read_ledger(&mut self) -> Result<Option<LedgerBundle>> {
        if self.next_ledger() {
            return Ok(self.data.as_deref().cloned());
        }
        match self.take_err() {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    fn close(&mut self) {
        log::debug!("🔚 Cursor {} closed at {}", self.name, self.position());
    }
}
