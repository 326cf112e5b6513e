//! Generic pipeline executor

use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

/// Items buffered between two stages before the sender waits.
pub const STAGE_CHANNEL_CAPACITY: usize = 64;

/// Sequential source of pipeline items.
///
/// Runs on a blocking thread, so implementations may do synchronous I/O.
/// `Ok(None)` ends the stream.
pub trait StateReader<T>: Send + 'static {
    fn read(&mut self) -> Result<Option<T>>;

    /// Called once after the last `read`, whatever the outcome.
    fn close(&mut self) {}
}

#[async_trait]
pub trait StateProcessor<T>: Send + Sync {
    async fn process(&self, item: &T) -> Result<()>;

    /// Stage name used in logs and error reports.
    fn name(&self) -> String;
}

/// A processing stage and the stages that receive its items afterwards.
pub struct PipelineNode<T> {
    processor: Box<dyn StateProcessor<T>>,
    children: Vec<PipelineNode<T>>,
}

impl<T: Send + Sync + 'static> PipelineNode<T> {
    pub fn new(processor: impl StateProcessor<T> + 'static) -> Self {
        Self {
            processor: Box::new(processor),
            children: Vec::new(),
        }
    }

    pub fn pipe(mut self, children: impl IntoIterator<Item = PipelineNode<T>>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn name(&self) -> String {
        self.processor.name()
    }

    /// Spawn this stage (and its subtree) and return the stage's input.
    fn spawn(self, tasks: &mut JoinSet<Result<()>>) -> mpsc::Sender<Arc<T>> {
        let (tx, mut rx) = mpsc::channel::<Arc<T>>(STAGE_CHANNEL_CAPACITY);
        let outputs: Vec<_> = self.children.into_iter().map(|child| child.spawn(tasks)).collect();
        let processor = self.processor;

        tasks.spawn(async move {
            let name = processor.name();
            let mut processed = 0u64;

            while let Some(item) = rx.recv().await {
                if let Err(e) = processor.process(&item).await {
                    log::error!("❌ Stage {} failed after {} items: {}", name, processed, e);
                    return Err(e);
                }
                processed += 1;

                for output in &outputs {
                    if output.send(Arc::clone(&item)).await.is_err() {
                        log::warn!("⚠️  Stage {} stopping: downstream closed", name);
                        return Ok(());
                    }
                }
            }

            log::debug!("✅ Stage {} finished ({} items)", name, processed);
            Ok(())
        });

        tx
    }
}

/// A tree of stages rooted at one node.
pub struct Pipeline<T> {
    root: PipelineNode<T>,
}

impl<T: Send + Sync + 'static> Pipeline<T> {
    pub fn new(root: PipelineNode<T>) -> Self {
        Self { root }
    }

    /// Start feeding `reader` through the stages.
    ///
    /// Must be called inside a tokio runtime. The returned handle resolves
    /// once every stage has stopped.
    pub fn process(self, reader: impl StateReader<T>) -> PipelineHandle {
        let mut tasks = JoinSet::new();
        let input = self.root.spawn(&mut tasks);
        let cancelled = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&cancelled);
        let reading = tokio::task::spawn_blocking(move || feed(reader, input, flag));

        let driver = tokio::spawn(async move {
            let mut first = match reading.await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(e) => Some(IngestError::Pipeline {
                    stage: "reader".to_string(),
                    message: e.to_string(),
                }),
            };

            while let Some(joined) = tasks.join_next().await {
                let outcome = joined.unwrap_or_else(|e| {
                    Err(IngestError::Pipeline {
                        stage: "stage".to_string(),
                        message: e.to_string(),
                    })
                });
                if let Err(e) = outcome {
                    first.get_or_insert(e);
                }
            }

            first.map_or(Ok(()), Err)
        });

        PipelineHandle { driver, cancelled }
    }
}

fn feed<T: Send + Sync + 'static>(
    mut reader: impl StateReader<T>,
    input: mpsc::Sender<Arc<T>>,
    cancelled: Arc<AtomicBool>,
) -> Result<()> {
    let outcome = loop {
        if cancelled.load(Ordering::Acquire) {
            log::info!("🛑 Pipeline cancelled, closing input");
            break Ok(());
        }
        match reader.read() {
            Ok(Some(item)) => {
                if input.blocking_send(Arc::new(item)).is_err() {
                    break Ok(());
                }
            }
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        }
    };
    reader.close();
    outcome
}

/// Completion handle for one pipeline run.
pub struct PipelineHandle {
    driver: JoinHandle<Result<()>>,
    cancelled: Arc<AtomicBool>,
}

impl PipelineHandle {
    /// Stop reading new items. Items already in flight still finish.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolve to `Ok(())` when every item passed every stage, or to the
    /// first failure encountered.
    pub async fn wait(self) -> Result<()> {
        self.driver.await.map_err(|e| IngestError::Pipeline {
            stage: "driver".to_string(),
            message: e.to_string(),
        })?
    }
}
