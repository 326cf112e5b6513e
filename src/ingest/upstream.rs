//! Queries against the upstream (core) store
//!
//! Everything here is read-only apart from `set_cursor`, which writes this
//! ingester's own position marker.

use crate::error::{IngestError, Result};
use crate::ledger::{
    Asset, LedgerBundle, LedgerHeader, Transaction, TransactionEnvelope, TransactionFee,
    TransactionResult,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Load header, transactions and fee records for one ledger.
pub fn load_bundle(conn: &Connection, sequence: u32) -> Result<LedgerBundle> {
    let header = load_header(conn, sequence)?;
    let transactions = load_transactions(conn, sequence)?;
    let fees = load_fees(conn, sequence)?;

    Ok(LedgerBundle {
        sequence,
        header,
        transactions,
        fees,
    })
}

pub fn load_header(conn: &Connection, sequence: u32) -> Result<LedgerHeader> {
    conn.query_row(
        "SELECT ledgerhash, prevhash, closetime, protocolversion, totalcoins,
                feepool, basefee, basereserve, maxtxsetsize
         FROM ledgerheaders WHERE ledgerseq = ?1",
        [sequence],
        |row| {
            Ok(LedgerHeader {
                sequence,
                hash: row.get(0)?,
                previous_hash: row.get(1)?,
                close_time: row.get(2)?,
                protocol_version: row.get(3)?,
                total_coins: row.get(4)?,
                fee_pool: row.get(5)?,
                base_fee: row.get(6)?,
                base_reserve: row.get(7)?,
                max_tx_set_size: row.get(8)?,
            })
        },
    )
    .optional()
    .map_err(|e| IngestError::read(sequence, e))?
    .ok_or(IngestError::MissingLedger(sequence))
}

/// Transactions of one ledger in application order.
pub fn load_transactions(conn: &Connection, sequence: u32) -> Result<Vec<Transaction>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT txid, txindex, txbody, txresult FROM txhistory
             WHERE ledgerseq = ?1 ORDER BY txindex",
        )
        .map_err(|e| IngestError::read(sequence, e))?;

    let rows = stmt
        .query_map([sequence], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u32>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| IngestError::read(sequence, e))?;

    let mut transactions = Vec::new();
    for row in rows {
        let (hash, index, body, result) = row.map_err(|e| IngestError::read(sequence, e))?;
        let decode = |what: &str, e: serde_json::Error| IngestError::UpstreamDecode {
            sequence,
            message: format!("{} of tx {}: {}", what, hash, e),
        };

        let envelope: TransactionEnvelope =
            serde_json::from_str(&body).map_err(|e| decode("envelope", e))?;
        let result: TransactionResult =
            serde_json::from_str(&result).map_err(|e| decode("result", e))?;

        transactions.push(Transaction {
            hash,
            ledger_sequence: sequence,
            index,
            envelope,
            result,
        });
    }

    Ok(transactions)
}

pub fn load_fees(conn: &Connection, sequence: u32) -> Result<Vec<TransactionFee>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT txid, txindex, feecharged FROM txfeehistory
             WHERE ledgerseq = ?1 ORDER BY txindex",
        )
        .map_err(|e| IngestError::read(sequence, e))?;

    let fees = stmt
        .query_map([sequence], |row| {
            Ok(TransactionFee {
                hash: row.get(0)?,
                ledger_sequence: sequence,
                index: row.get(1)?,
                fee_charged: row.get(2)?,
            })
        })
        .map_err(|e| IngestError::read(sequence, e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| IngestError::read(sequence, e))?;

    Ok(fees)
}

/// Highest ledger sequence the upstream store has closed.
pub fn latest_ledger(conn: &Connection) -> Result<Option<u32>> {
    conn.query_row("SELECT MAX(ledgerseq) FROM ledgerheaders", [], |row| row.get(0))
        .map_err(IngestError::Upstream)
}

/// Lowest ledger sequence still held upstream.
pub fn earliest_ledger(conn: &Connection) -> Result<Option<u32>> {
    conn.query_row("SELECT MIN(ledgerseq) FROM ledgerheaders", [], |row| row.get(0))
        .map_err(IngestError::Upstream)
}

/// Position marker for cursor `name`, if one was ever written.
pub fn get_cursor(conn: &Connection, name: &str) -> Result<Option<u32>> {
    conn.query_row("SELECT lastread FROM pubsub WHERE resid = ?1", [name], |row| row.get(0))
        .optional()
        .map_err(IngestError::Upstream)
}

/// Advance the marker for cursor `name` to `sequence`. Never moves it backwards.
pub fn set_cursor(conn: &Connection, name: &str, sequence: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO pubsub (resid, lastread) VALUES (?1, ?2)
         ON CONFLICT(resid) DO UPDATE SET lastread = MAX(lastread, excluded.lastread)",
        params![name, sequence],
    )
    .map_err(IngestError::Upstream)?;
    Ok(())
}

/// Sum of balances and number of trustlines held for `asset`.
pub fn trustline_totals(conn: &Connection, asset: &Asset) -> Result<(i128, i64)> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT balance FROM trustlines
             WHERE assettype = ?1 AND assetcode = ?2 AND issuer = ?3",
        )
        .map_err(IngestError::Upstream)?;

    // Summed in Rust: SQLite's SUM overflows at i64.
    let balances = stmt
        .query_map(
            params![asset.trustline_type(), asset.code(), asset.issuer()],
            |row| row.get::<_, i64>(0),
        )
        .map_err(IngestError::Upstream)?;

    let mut total = 0i128;
    let mut count = 0i64;
    for balance in balances {
        total += balance.map_err(IngestError::Upstream)? as i128;
        count += 1;
    }
    Ok((total, count))
}

/// Flags and home domain of an account, if it exists.
pub fn account_settings(conn: &Connection, address: &str) -> Result<Option<(i64, String)>> {
    conn.query_row(
        "SELECT flags, homedomain FROM accounts WHERE accountid = ?1",
        [address],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(IngestError::Upstream)
}
