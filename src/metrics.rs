//! Ingestion metrics.
//!
//! Three phase timers per run, emitted through the `metrics` facade and
//! mirrored in-process so callers can read back what a run recorded.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// ============================================================================
// Metric Names
// ============================================================================

/// Clear phase duration histogram.
pub const CLEAR_DURATION: &str = "ingest_clear_duration_seconds";

/// Stream-and-transform phase duration histogram.
pub const INGEST_DURATION: &str = "ingest_ingest_duration_seconds";

/// Single upstream ledger load duration histogram.
pub const LOAD_DURATION: &str = "ingest_load_duration_seconds";

/// Ledgers ingested counter.
pub const LEDGERS_INGESTED: &str = "ingest_ledgers_total";

// ============================================================================
// Metric Registration
// ============================================================================

/// Registers all ingestion metric descriptions.
///
/// Call this once at application startup after initializing the metrics recorder.
pub fn register_metrics() {
    describe_histogram!(CLEAR_DURATION, "Duration of range clears in seconds");
    describe_histogram!(INGEST_DURATION, "Duration of ingestion runs in seconds");
    describe_histogram!(LOAD_DURATION, "Duration of upstream ledger loads in seconds");
    describe_counter!(LEDGERS_INGESTED, "Total ledgers ingested");
}

/// Records ledgers committed by one session.
pub fn record_ledgers_ingested(count: u64) {
    counter!(LEDGERS_INGESTED).increment(count);
}

// ============================================================================
// Timers
// ============================================================================

/// A named duration histogram that also keeps a local count and total.
#[derive(Debug)]
pub struct Timer {
    name: &'static str,
    count: AtomicU64,
    total_nanos: AtomicU64,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            count: AtomicU64::new(0),
            total_nanos: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            timer: self,
            started: Instant::now(),
        }
    }

    pub fn record(&self, elapsed: Duration) {
        histogram!(self.name).record(elapsed.as_secs_f64());
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Samples recorded so far.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> Duration {
        Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed))
    }
}

/// Records the elapsed time into its timer when stopped or dropped.
pub struct TimerGuard<'a> {
    timer: &'a Timer,
    started: Instant,
}

impl TimerGuard<'_> {
    /// Stop timing and return the elapsed time.
    pub fn stop(self) -> Duration {
        self.started.elapsed()
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.record(self.started.elapsed());
    }
}

/// Timers shared by a `System` and every `Session` it spawns.
#[derive(Debug)]
pub struct IngesterMetrics {
    pub clear_ledger: Timer,
    pub ingest_ledger: Timer,
    pub load_ledger: Timer,
}

impl IngesterMetrics {
    pub fn new() -> Self {
        Self {
            clear_ledger: Timer::new(CLEAR_DURATION),
            ingest_ledger: Timer::new(INGEST_DURATION),
            load_ledger: Timer::new(LOAD_DURATION),
        }
    }
}

impl Default for IngesterMetrics {
    fn default() -> Self {
        Self::new()
    }
}
