//! Ingestion write façade
//!
//! Owns the session's destination connection and one `BatchInsertBuilder`
//! per history table. Transform code calls one method per table and never
//! touches batching mechanics. Every row is tagged with `CURRENT_VERSION`.

use super::batch::{BatchInsertBuilder, Row, Value};
use super::{TableName, CURRENT_VERSION};
use crate::error::{IngestError, Result};
use crate::ledger::{toid, Asset, ClaimOfferAtom, LedgerBundle, Transaction};
use rusqlite::Connection;
use std::collections::{HashMap, HashSet};

/// Effect type codes stored in `history_effects.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectType {
    AccountCreated,
    AccountRemoved,
    AccountCredited,
    AccountDebited,
    AccountThresholdsUpdated,
    AccountHomeDomainUpdated,
    AccountFlagsUpdated,
    SignerCreated,
    SignerRemoved,
    SignerUpdated,
    TrustlineCreated,
    TrustlineRemoved,
    TrustlineUpdated,
    TrustlineAuthorized,
    TrustlineDeauthorized,
    Trade,
    DataCreated,
    DataRemoved,
    DataUpdated,
    SequenceBumped,
}

impl EffectType {
    pub fn code(&self) -> i64 {
        match self {
            EffectType::AccountCreated => 0,
            EffectType::AccountRemoved => 1,
            EffectType::AccountCredited => 2,
            EffectType::AccountDebited => 3,
            EffectType::AccountThresholdsUpdated => 4,
            EffectType::AccountHomeDomainUpdated => 5,
            EffectType::AccountFlagsUpdated => 6,
            EffectType::SignerCreated => 10,
            EffectType::SignerRemoved => 11,
            EffectType::SignerUpdated => 12,
            EffectType::TrustlineCreated => 20,
            EffectType::TrustlineRemoved => 21,
            EffectType::TrustlineUpdated => 22,
            EffectType::TrustlineAuthorized => 23,
            EffectType::TrustlineDeauthorized => 24,
            EffectType::Trade => 33,
            EffectType::DataCreated => 40,
            EffectType::DataRemoved => 41,
            EffectType::DataUpdated => 42,
            EffectType::SequenceBumped => 43,
        }
    }
}

pub struct Ingestion {
    conn: Connection,
    builders: HashMap<TableName, BatchInsertBuilder>,
    seen_accounts: HashSet<String>,
    seen_assets: HashSet<Asset>,
}

impl Ingestion {
    pub fn new(conn: Connection) -> Self {
        let builders = TableName::INGESTION_TABLES
            .iter()
            .map(|&table| (table, BatchInsertBuilder::new(table)))
            .collect();

        Self {
            conn,
            builders,
            seen_accounts: HashSet::new(),
            seen_assets: HashSet::new(),
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Rows buffered across all builders.
    pub fn pending_rows(&self) -> usize {
        self.builders.values().map(BatchInsertBuilder::len).sum()
    }

    /// Rows buffered for one table.
    pub fn pending(&self, table: TableName) -> usize {
        self.builders.get(&table).map_or(0, BatchInsertBuilder::len)
    }

    fn add(&mut self, table: TableName, row: Row) -> Result<()> {
        self.builders
            .entry(table)
            .or_insert_with(|| BatchInsertBuilder::new(table))
            .add(row.set("importer_version", CURRENT_VERSION))
    }

    /// Delete every range-keyed row for ledgers `first..=last`.
    ///
    /// One database transaction: either the whole range is cleared or
    /// nothing is. Identity tables and asset stats are left alone.
    pub fn clear(&mut self, first: u32, last: u32) -> Result<usize> {
        let (start, end) = toid::ledger_range(first, last);
        let tx = self
            .conn
            .transaction()
            .map_err(|e| IngestError::write("clear", e))?;

        let mut deleted = 0;
        for table in TableName::INGESTION_TABLES {
            let Some(column) = table.range_column() else {
                continue;
            };
            let sql = format!("DELETE FROM {} WHERE {} >= ?1 AND {} < ?2", table, column, column);
            deleted += tx
                .execute(&sql, rusqlite::params![start, end])
                .map_err(|e| IngestError::write(table.as_str(), e))?;
        }

        tx.commit().map_err(|e| IngestError::write("clear", e))?;
        log::debug!("🧹 Cleared {} rows for ledgers {}..={}", deleted, first, last);
        Ok(deleted)
    }

    /// Register an account in `history_accounts` (once per session).
    pub fn account(&mut self, address: &str) -> Result<()> {
        if self.seen_accounts.contains(address) {
            return Ok(());
        }
        self.add(TableName::Accounts, Row::new().set("address", address))?;
        self.seen_accounts.insert(address.to_string());
        Ok(())
    }

    /// Register a non-native asset in `history_assets` (once per session).
    pub fn asset(&mut self, asset: &Asset) -> Result<()> {
        if asset.is_native() || self.seen_assets.contains(asset) {
            return Ok(());
        }
        self.add(
            TableName::Assets,
            Row::new()
                .set("asset_type", asset.asset_type())
                .set("asset_code", asset.code())
                .set("asset_issuer", asset.issuer()),
        )?;
        self.seen_assets.insert(asset.clone());
        Ok(())
    }

    pub fn ledger(&mut self, bundle: &LedgerBundle) -> Result<()> {
        let header = &bundle.header;
        self.add(
            TableName::Ledgers,
            Row::new()
                .set("id", toid::ledger_id(bundle.sequence))
                .set("sequence", bundle.sequence)
                .set("ledger_hash", header.hash.as_str())
                .set("previous_ledger_hash", header.previous_hash.as_str())
                .set("transaction_count", bundle.transactions.len())
                .set("successful_transaction_count", bundle.successful_transaction_count())
                .set("failed_transaction_count", bundle.failed_transaction_count())
                .set("operation_count", bundle.operation_count())
                .set("closed_at", header.closed_at())
                .set("total_coins", header.total_coins)
                .set("fee_pool", header.fee_pool)
                .set("base_fee", header.base_fee)
                .set("base_reserve", header.base_reserve)
                .set("max_tx_set_size", header.max_tx_set_size)
                .set("protocol_version", header.protocol_version),
        )
    }

    pub fn transaction(&mut self, id: i64, tx: &Transaction, fee_paid: i64) -> Result<()> {
        let envelope = &tx.envelope;
        self.add(
            TableName::Transactions,
            Row::new()
                .set("id", id)
                .set("transaction_hash", tx.hash.as_str())
                .set("ledger_sequence", tx.ledger_sequence)
                .set("application_order", tx.index)
                .set("account", envelope.source_account.as_str())
                .set("account_sequence", envelope.sequence)
                .set("fee_paid", fee_paid)
                .set("operation_count", envelope.operations.len())
                .set("successful", tx.successful())
                .set("memo_type", envelope.memo.memo_type())
                .set("memo", envelope.memo.value())
                .set("time_bounds", envelope.time_bounds.as_ref().map(|tb| tb.to_range())),
        )
    }

    pub fn transaction_participants(&mut self, transaction_id: i64, participants: &[String]) -> Result<()> {
        for address in participants {
            self.account(address)?;
            self.add(
                TableName::TransactionParticipants,
                Row::new()
                    .set("history_transaction_id", transaction_id)
                    .set("history_account_id", Value::Account(address.clone())),
            )?;
        }
        Ok(())
    }

    pub fn operation(
        &mut self,
        id: i64,
        transaction_id: i64,
        order: u32,
        type_code: i64,
        details: &serde_json::Value,
        source: &str,
    ) -> Result<()> {
        self.add(
            TableName::Operations,
            Row::new()
                .set("id", id)
                .set("transaction_id", transaction_id)
                .set("application_order", order)
                .set("type", type_code)
                .set("details", details.to_string())
                .set("source_account", source),
        )
    }

    pub fn operation_participants(&mut self, operation_id: i64, participants: &[String]) -> Result<()> {
        for address in participants {
            self.account(address)?;
            self.add(
                TableName::OperationParticipants,
                Row::new()
                    .set("history_operation_id", operation_id)
                    .set("history_account_id", Value::Account(address.clone())),
            )?;
        }
        Ok(())
    }

    pub fn effect(
        &mut self,
        address: &str,
        operation_id: i64,
        order: u32,
        effect: EffectType,
        details: &serde_json::Value,
    ) -> Result<()> {
        self.account(address)?;
        self.add(
            TableName::Effects,
            Row::new()
                .set("history_account_id", Value::Account(address.to_string()))
                .set("history_operation_id", operation_id)
                .set("order", order)
                .set("type", effect.code())
                .set("details", details.to_string()),
        )
    }

    /// One crossed offer. The seller's side is recorded as base.
    pub fn trade(
        &mut self,
        operation_id: i64,
        order: u32,
        closed_at: &str,
        buyer: &str,
        claim: &ClaimOfferAtom,
    ) -> Result<()> {
        self.account(buyer)?;
        self.account(&claim.seller_id)?;
        self.asset(&claim.asset_sold)?;
        self.asset(&claim.asset_bought)?;

        self.add(
            TableName::Trades,
            Row::new()
                .set("history_operation_id", operation_id)
                .set("order", order)
                .set("ledger_closed_at", closed_at)
                .set("offer_id", claim.offer_id)
                .set("base_account_id", Value::Account(claim.seller_id.clone()))
                .set("base_asset_id", Value::Asset(claim.asset_sold.clone()))
                .set("base_amount", claim.amount_sold)
                .set("counter_account_id", Value::Account(buyer.to_string()))
                .set("counter_asset_id", Value::Asset(claim.asset_bought.clone()))
                .set("counter_amount", claim.amount_bought)
                .set("base_is_seller", true)
                .set("price_n", claim.amount_bought)
                .set("price_d", claim.amount_sold),
        )
    }

    /// Flush every builder, identity tables first. Stops at the first failure.
    pub fn flush(&mut self) -> Result<usize> {
        let mut written = 0;
        for table in TableName::INGESTION_TABLES {
            if let Some(builder) = self.builders.get_mut(&table) {
                written += builder.flush(&mut self.conn)?;
            }
        }
        Ok(written)
    }
}

/// Assigns ordinals to the effects of one operation.
///
/// Ordinals start at 1 and follow call order, so re-deriving the same
/// operation yields the same `(operation_id, order)` keys.
#[derive(Debug)]
pub struct EffectIngestion {
    operation_id: i64,
    added: u32,
}

impl EffectIngestion {
    pub fn new(operation_id: i64) -> Self {
        Self {
            operation_id,
            added: 0,
        }
    }

    pub fn operation_id(&self) -> i64 {
        self.operation_id
    }

    /// Effects added so far.
    pub fn added(&self) -> u32 {
        self.added
    }

    pub fn add(
        &mut self,
        dest: &mut Ingestion,
        address: &str,
        effect: EffectType,
        details: serde_json::Value,
    ) -> Result<()> {
        let order = self.added + 1;
        dest.effect(address, self.operation_id, order, effect, &details)?;
        self.added = order;
        Ok(())
    }
}
