//! # Ingestion engine
//!
//! Moves closed ledgers from the upstream (core) store into the history
//! store, one bounded range per session.
//!
//! ```text
//! System ──spawns──▶ Session
//!                      │ next_ledger()
//!                      ▼
//!                    Cursor ──LedgerBundle──▶ transform ──rows──▶ Ingestion
//!                                                 │                  │ per-table
//!                                                 ▼                  ▼
//!                                            AssetStats      BatchInsertBuilder
//! ```
//!
//! A session runs four strictly sequential phases: clear (optional), stream &
//! transform, flush, commit cursor. Any failure before the commit leaves the
//! upstream cursor marker untouched, so the next run replays the range.
//! Delivery is at-least-once; the clear phase is what makes replay safe.
//!
//! ## Module Organization
//!
//! - `batch` - per-table row accumulator with chunked flushes
//! - `refs` - account/asset reference → history id exchange
//! - `ingestion` - write façade over one builder per table, effect ordinals
//! - `asset_stats` - pending-asset set and recompute-from-state writer
//! - `cursor` - sequential reader over an upstream ledger range
//! - `upstream` - queries against the core store
//! - `transform` - ledger bundle → history rows
//! - `session` - one ingestion attempt
//! - `system` - shared resources and run exclusion

pub mod asset_stats;
pub mod batch;
pub mod cursor;
pub mod ingestion;
pub mod refs;
pub mod session;
pub mod system;
pub mod transform;
pub mod upstream;

pub use asset_stats::AssetStats;
pub use batch::{BatchInsertBuilder, Row, Value};
pub use cursor::{Cursor, CursorPosition};
pub use ingestion::{EffectIngestion, EffectType, Ingestion};
pub use session::{Session, SessionReport};
pub use system::{RunLock, RunPermit, System};

/// Version of the ingestion algorithm. Every history row is tagged with it.
///
/// Bump when any derived row changes incompatibly; rows carrying an older
/// version can then be found and re-ingested by a maintenance job.
pub const CURRENT_VERSION: i64 = 16;

/// Destination tables written by the ingestion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableName {
    AssetStats,
    Accounts,
    Assets,
    Effects,
    Ledgers,
    OperationParticipants,
    Operations,
    Trades,
    TransactionParticipants,
    Transactions,
}

impl TableName {
    /// Tables owned by the `Ingestion` façade, in flush order. Identity
    /// tables go first so references resolve against rows just written.
    pub const INGESTION_TABLES: [TableName; 9] = [
        TableName::Accounts,
        TableName::Assets,
        TableName::Ledgers,
        TableName::Transactions,
        TableName::TransactionParticipants,
        TableName::Operations,
        TableName::OperationParticipants,
        TableName::Effects,
        TableName::Trades,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::AssetStats => "asset_stats",
            TableName::Accounts => "history_accounts",
            TableName::Assets => "history_assets",
            TableName::Effects => "history_effects",
            TableName::Ledgers => "history_ledgers",
            TableName::OperationParticipants => "history_operation_participants",
            TableName::Operations => "history_operations",
            TableName::Trades => "history_trades",
            TableName::TransactionParticipants => "history_transaction_participants",
            TableName::Transactions => "history_transactions",
        }
    }

    /// TOID-valued column used to clear a ledger range, for range-keyed tables.
    pub fn range_column(&self) -> Option<&'static str> {
        match self {
            TableName::Ledgers | TableName::Transactions | TableName::Operations => Some("id"),
            TableName::TransactionParticipants => Some("history_transaction_id"),
            TableName::OperationParticipants | TableName::Effects | TableName::Trades => {
                Some("history_operation_id")
            }
            TableName::Accounts | TableName::Assets | TableName::AssetStats => None,
        }
    }

    /// Conflict clause appended to inserts, if any.
    pub fn insert_suffix(&self) -> Option<&'static str> {
        match self {
            TableName::Accounts | TableName::Assets => Some("ON CONFLICT DO NOTHING"),
            TableName::AssetStats => Some(
                "ON CONFLICT(id) DO UPDATE SET amount = excluded.amount, \
                 num_accounts = excluded.num_accounts, flags = excluded.flags, \
                 toml = excluded.toml, importer_version = excluded.importer_version",
            ),
            _ => None,
        }
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
