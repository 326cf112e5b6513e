//! Account and asset references
//!
//! Rows name accounts by address and assets by (type, code, issuer). Before
//! a batch is written those references are exchanged for integer ids,
//! creating the identity rows on first sight. Runs inside the flushing
//! builder's transaction, so a failed flush also rolls back new identities.

use super::batch::{Value, MAX_PARAMS};
use super::{TableName, CURRENT_VERSION};
use crate::error::{IngestError, Result};
use crate::ledger::Asset;
use rusqlite::types::Value as SqlValue;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Default)]
pub struct IdMap {
    accounts: HashMap<String, i64>,
    assets: HashMap<Asset, i64>,
}

impl IdMap {
    pub fn account(&self, address: &str) -> Option<i64> {
        self.accounts.get(address).copied()
    }

    pub fn asset(&self, asset: &Asset) -> Option<i64> {
        self.assets.get(asset).copied()
    }
}

/// Get-or-create ids for every reference found in `rows`.
pub fn resolve(conn: &rusqlite::Connection, rows: &[Vec<Value>]) -> Result<IdMap> {
    let mut addresses = BTreeSet::new();
    let mut assets = BTreeSet::new();

    for value in rows.iter().flatten() {
        match value {
            Value::Account(address) => {
                addresses.insert(address.as_str());
            }
            Value::Asset(asset) => {
                assets.insert(asset);
            }
            _ => {}
        }
    }

    let mut ids = IdMap::default();
    if !addresses.is_empty() {
        ids.accounts = account_ids(conn, &addresses.into_iter().collect::<Vec<_>>())?;
    }
    if !assets.is_empty() {
        ids.assets = asset_ids(conn, &assets.into_iter().collect::<Vec<_>>())?;
    }
    Ok(ids)
}

/// Ids for `addresses`, inserting any that `history_accounts` lacks.
pub fn account_ids(conn: &rusqlite::Connection, addresses: &[&str]) -> Result<HashMap<String, i64>> {
    let table = TableName::Accounts.as_str();
    let write = |e| IngestError::write(table, e);
    let mut ids = HashMap::with_capacity(addresses.len());

    // 2 params per inserted row
    for chunk in addresses.chunks(MAX_PARAMS / 2) {
        let sql = format!(
            "INSERT INTO {} (address, importer_version) VALUES {} ON CONFLICT DO NOTHING",
            table,
            vec!["(?,?)"; chunk.len()].join(",")
        );
        let params = chunk.iter().flat_map(|address| {
            [SqlValue::Text(address.to_string()), SqlValue::Integer(CURRENT_VERSION)]
        });
        conn.execute(&sql, rusqlite::params_from_iter(params))
            .map_err(write)?;

        let sql = format!(
            "SELECT id, address FROM {} WHERE address IN ({})",
            table,
            vec!["?"; chunk.len()].join(",")
        );
        let mut stmt = conn.prepare(&sql).map_err(write)?;
        let found = stmt
            .query_map(rusqlite::params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, i64>(0)?))
            })
            .map_err(write)?;
        for entry in found {
            let (address, id) = entry.map_err(write)?;
            ids.insert(address, id);
        }
    }

    Ok(ids)
}

/// Ids for `assets`, inserting any that `history_assets` lacks.
pub fn asset_ids(conn: &rusqlite::Connection, assets: &[&Asset]) -> Result<HashMap<Asset, i64>> {
    let table = TableName::Assets.as_str();
    let write = |e| IngestError::write(table, e);
    let mut ids = HashMap::with_capacity(assets.len());

    let mut insert = conn
        .prepare_cached(
            "INSERT INTO history_assets (asset_type, asset_code, asset_issuer, importer_version)
             VALUES (?1, ?2, ?3, ?4) ON CONFLICT DO NOTHING",
        )
        .map_err(write)?;
    let mut select = conn
        .prepare_cached(
            "SELECT id FROM history_assets
             WHERE asset_type = ?1 AND asset_code = ?2 AND asset_issuer = ?3",
        )
        .map_err(write)?;

    for asset in assets {
        insert
            .execute(rusqlite::params![
                asset.asset_type(),
                asset.code(),
                asset.issuer(),
                CURRENT_VERSION
            ])
            .map_err(write)?;
        let id: i64 = select
            .query_row(
                rusqlite::params![asset.asset_type(), asset.code(), asset.issuer()],
                |row| row.get(0),
            )
            .map_err(write)?;
        ids.insert((*asset).clone(), id);
    }

    Ok(ids)
}
