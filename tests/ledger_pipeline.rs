mod common;

use async_trait::async_trait;
use common::*;
use ledger_ingest::error::{IngestError, Result};
use ledger_ingest::ledger::LedgerBundle;
use ledger_ingest::pipeline::{ledger_node, LedgerPipeline, LedgerProcessor};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct Counter {
    ledgers: Arc<Mutex<Vec<u32>>>,
    transactions: Arc<Mutex<usize>>,
}

#[async_trait]
impl LedgerProcessor for Counter {
    async fn process_ledger(&self, bundle: &LedgerBundle) -> Result<()> {
        self.ledgers.lock().unwrap().push(bundle.sequence);
        *self.transactions.lock().unwrap() += bundle.transactions.len();
        Ok(())
    }

    fn name(&self) -> String {
        "counter".to_string()
    }
}

#[tokio::test]
async fn test_cursor_feeds_pipeline() {
    let fixture = Fixture::new();
    for seq in 5..=7 {
        fixture.add_standard_ledger(seq);
    }
    let system = fixture.system(fixture.config());
    let counter = Counter::default();

    let cursor = system.new_cursor(5, 7).unwrap();
    LedgerPipeline::new(ledger_node(counter.clone()))
        .process(cursor)
        .wait()
        .await
        .unwrap();

    assert_eq!(*counter.ledgers.lock().unwrap(), vec![5, 6, 7]);
    assert_eq!(*counter.transactions.lock().unwrap(), 9);
    // a standalone cursor never moves the marker or takes the run lock
    assert_eq!(fixture.marker("HISTORY"), None);
    assert!(!system.is_running());
}

#[tokio::test]
async fn test_missing_ledger_fails_pipeline() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    fixture.add_standard_ledger(7);
    let system = fixture.system(fixture.config());
    let counter = Counter::default();

    let cursor = system.new_cursor(5, 7).unwrap();
    let err = LedgerPipeline::new(ledger_node(counter.clone()))
        .process(cursor)
        .wait()
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::MissingLedger(6)));
    assert_eq!(*counter.ledgers.lock().unwrap(), vec![5]);
}
