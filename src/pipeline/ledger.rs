//! Ledger adapters for the generic executor
//!
//! `ledger_node` turns a ledger transform into a pipeline stage and
//! `LedgerPipeline::process` turns a sequential ledger source into the
//! reader the executor drives. Neither side needs to know about the other.

use super::executor::{Pipeline, PipelineHandle, PipelineNode, StateProcessor, StateReader};
use crate::error::Result;
use crate::ledger::LedgerBundle;
use async_trait::async_trait;

/// Sequential, blocking source of ledger bundles.
pub trait LedgerReader: Send + 'static {
    /// Next bundle in ascending sequence order, `Ok(None)` at end of range.
    fn read_ledger(&mut self) -> Result<Option<LedgerBundle>>;

    fn close(&mut self) {}
}

/// Transforms one ledger's data.
#[async_trait]
pub trait LedgerProcessor: Send + Sync {
    async fn process_ledger(&self, bundle: &LedgerBundle) -> Result<()>;

    fn name(&self) -> String;
}

struct LedgerProcessorStage<P>(P);

#[async_trait]
impl<P: LedgerProcessor> StateProcessor<LedgerBundle> for LedgerProcessorStage<P> {
    async fn process(&self, item: &LedgerBundle) -> Result<()> {
        self.0.process_ledger(item).await
    }

    fn name(&self) -> String {
        self.0.name()
    }
}

struct LedgerReaderSource<R>(R);

impl<R: LedgerReader> StateReader<LedgerBundle> for LedgerReaderSource<R> {
    fn read(&mut self) -> Result<Option<LedgerBundle>> {
        self.0.read_ledger()
    }

    fn close(&mut self) {
        self.0.close();
    }
}

/// Wrap a ledger processor as a pipeline stage.
pub fn ledger_node<P: LedgerProcessor + 'static>(processor: P) -> PipelineNode<LedgerBundle> {
    PipelineNode::new(LedgerProcessorStage(processor))
}

pub struct LedgerPipeline {
    pipeline: Pipeline<LedgerBundle>,
}

impl LedgerPipeline {
    pub fn new(root: PipelineNode<LedgerBundle>) -> Self {
        Self {
            pipeline: Pipeline::new(root),
        }
    }

    pub fn process(self, reader: impl LedgerReader) -> PipelineHandle {
        self.pipeline.process(LedgerReaderSource(reader))
    }
}
