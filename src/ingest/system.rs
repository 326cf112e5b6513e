//! Process-scoped owner of stores, config, metrics and the run lock.

use super::cursor::Cursor;
use super::session::{Session, SessionReport};
use super::upstream;
use crate::config::IngestConfig;
use crate::db::{Store, StoreRole};
use crate::error::{IngestError, Result};
use crate::metrics::IngesterMetrics;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// At most one holder at a time. Acquisition never waits.
#[derive(Debug, Clone, Default)]
pub struct RunLock {
    inner: Arc<Mutex<()>>,
}

impl RunLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, or fail with `IngestError::Busy` if it is held.
    pub fn try_acquire(&self) -> Result<RunPermit> {
        Arc::clone(&self.inner)
            .try_lock_owned()
            .map(|guard| RunPermit { _guard: guard })
            .map_err(|_| IngestError::Busy)
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Proof of holding the run lock. Released on drop.
#[derive(Debug)]
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

pub struct System {
    config: IngestConfig,
    core: Store,
    history: Store,
    metrics: Arc<IngesterMetrics>,
    run_lock: RunLock,
}

impl System {
    /// Open both stores named by `config`.
    pub fn new(config: IngestConfig) -> Result<Self> {
        let core = Store::open(StoreRole::Upstream, &config.core_db_path)?;
        let history = Store::open(StoreRole::Destination, &config.history_db_path)?;
        Ok(Self::with_stores(config, core, history))
    }

    pub fn with_stores(config: IngestConfig, core: Store, history: Store) -> Self {
        Self {
            config,
            core,
            history,
            metrics: Arc::new(IngesterMetrics::new()),
            run_lock: RunLock::new(),
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<IngesterMetrics> {
        &self.metrics
    }

    pub fn core(&self) -> &Store {
        &self.core
    }

    pub fn history(&self) -> &Store {
        &self.history
    }

    /// True while a session holds the run lock.
    pub fn is_running(&self) -> bool {
        self.run_lock.is_held()
    }

    /// Start a session over `first..=last` on fresh connections.
    ///
    /// Fails with `IngestError::Busy` without waiting if another session
    /// from this system is still alive.
    pub fn new_session(&self, first: u32, last: u32) -> Result<Session> {
        let permit = self.run_lock.try_acquire()?;
        let core = self.core.clone_session()?;
        let history = self.history.clone_session()?;

        Session::new(
            permit,
            &self.config,
            core,
            history,
            first,
            last,
            Arc::clone(&self.metrics),
        )
    }

    /// Run one session over `first..=last` to completion.
    pub fn run_range(&self, first: u32, last: u32) -> Result<SessionReport> {
        self.new_session(first, last)?.run().into_result()
    }

    /// A standalone reader over `first..=last`, for pipeline use.
    /// Does not take the run lock and never writes the marker.
    pub fn new_cursor(&self, first: u32, last: u32) -> Result<Cursor> {
        Cursor::new(
            self.core.clone_session()?,
            first,
            last,
            self.config.cursor_name.as_str(),
            Arc::clone(&self.metrics),
        )
    }

    /// Last ledger this system's cursor has committed upstream.
    pub fn cursor_marker(&self) -> Result<Option<u32>> {
        upstream::get_cursor(&self.core.lock(), &self.config.cursor_name)
    }

    /// Newest ledger available upstream.
    pub fn latest_ledger(&self) -> Result<Option<u32>> {
        upstream::latest_ledger(&self.core.lock())
    }

    /// Range a resumed run should cover: the ledger after the marker (or
    /// the first available one) through the latest upstream ledger.
    pub fn pending_range(&self) -> Result<Option<(u32, u32)>> {
        let Some(latest) = self.latest_ledger()? else {
            return Ok(None);
        };

        let first = match self.cursor_marker()? {
            Some(marker) => marker + 1,
            None => match upstream::earliest_ledger(&self.core.lock())? {
                Some(earliest) => earliest,
                None => return Ok(None),
            },
        };

        Ok((first <= latest).then_some((first, latest)))
    }
}
