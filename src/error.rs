//! Error types for the ingestion engine.
//!
//! Every failure surfaces to the caller through `Session::err()` or
//! `Cursor::err()`; nothing in this crate retries.

use thiserror::Error;

/// Result type alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors produced while reading upstream ledgers or writing history rows.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A session is already running on this system.
    #[error("ingestion busy: a session is already running")]
    Busy,

    /// The requested ledger range is empty or inverted.
    #[error("invalid ledger range: first {first} > last {last}")]
    InvalidRange { first: u32, last: u32 },

    /// Reading a ledger from the upstream store failed.
    #[error("upstream read failed at ledger {sequence}: {source}")]
    UpstreamRead {
        sequence: u32,
        #[source]
        source: rusqlite::Error,
    },

    /// An upstream row could not be decoded.
    #[error("upstream decode failed at ledger {sequence}: {message}")]
    UpstreamDecode { sequence: u32, message: String },

    /// The upstream store has no header for a ledger inside the range.
    #[error("ledger {0} not found in upstream store")]
    MissingLedger(u32),

    /// Any other upstream query (markers, state lookups).
    #[error("upstream query failed: {0}")]
    Upstream(#[source] rusqlite::Error),

    /// Writing to a destination table failed.
    #[error("write to {table} failed: {source}")]
    DestinationWrite {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    /// An id component does not fit the id layout.
    #[error("id out of range: ledger {ledger} tx {transaction} op {operation}")]
    IdOutOfRange {
        ledger: u32,
        transaction: u32,
        operation: u32,
    },

    /// A row's value count does not match the builder's column list.
    #[error("row for {table} has {got} values, expected {expected}")]
    ArityMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    /// A row named different columns than the ones fixed by the first row.
    #[error("row for {table} does not match the fixed column list")]
    ColumnMismatch { table: String },

    /// A reference value could not be exchanged for a history id.
    #[error("unresolved reference in {table}: {reference}")]
    UnresolvedReference { table: String, reference: String },

    /// Schema migration failed.
    #[error("schema migration failed: {0}")]
    Migration(String),

    /// A pipeline stage failed or the executor was torn down.
    #[error("pipeline failure in {stage}: {message}")]
    Pipeline { stage: String, message: String },

    /// Filesystem access (schema directory, database parent directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Wrap a rusqlite error raised while writing `table`.
    pub fn write(table: impl Into<String>, source: rusqlite::Error) -> Self {
        IngestError::DestinationWrite {
            table: table.into(),
            source,
        }
    }

    /// Wrap a rusqlite error raised while loading ledger `sequence`.
    pub fn read(sequence: u32, source: rusqlite::Error) -> Self {
        IngestError::UpstreamRead { sequence, source }
    }

    /// True for failures that come from the destination store.
    pub fn is_destination(&self) -> bool {
        matches!(
            self,
            IngestError::DestinationWrite { .. } | IngestError::UnresolvedReference { .. }
        )
    }

    /// True for failures that come from the upstream store.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            IngestError::UpstreamRead { .. }
                | IngestError::UpstreamDecode { .. }
                | IngestError::MissingLedger(_)
                | IngestError::Upstream(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let read = IngestError::read(7, rusqlite::Error::InvalidQuery);
        assert!(read.is_upstream());
        assert!(!read.is_destination());
        assert!(read.to_string().contains("ledger 7"));

        let write = IngestError::write("history_effects", rusqlite::Error::InvalidQuery);
        assert!(write.is_destination());
        assert!(write.to_string().contains("history_effects"));

        assert!(!IngestError::Busy.is_upstream());
    }
}
