//! Shared fixtures: an upstream core store populated ledger by ledger and a
//! migrated, empty history store, both inside one temp directory.

#![allow(dead_code)]

use ledger_ingest::config::IngestConfig;
use ledger_ingest::db::run_schema_migrations;
use ledger_ingest::ingest::System;
use rusqlite::{params, Connection};
use serde_json::{json, Value as Json};
use std::path::PathBuf;
use tempfile::TempDir;

pub const SOURCE: &str = "GSOURCE";
pub const DESTINATION: &str = "GDESTINATION";
pub const ISSUER: &str = "GISSUER";
pub const CLOSE_TIME_BASE: i64 = 1_500_000_000;

pub struct Fixture {
    _dir: TempDir,
    pub core_path: PathBuf,
    pub history_path: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let core_path = dir.path().join("core.db");
        let history_path = dir.path().join("history.db");

        let mut core = Connection::open(&core_path).unwrap();
        run_schema_migrations(&mut core, "sql/core").unwrap();
        let mut history = Connection::open(&history_path).unwrap();
        run_schema_migrations(&mut history, "sql/history").unwrap();

        Self {
            _dir: dir,
            core_path,
            history_path,
        }
    }

    pub fn config(&self) -> IngestConfig {
        IngestConfig {
            core_db_path: self.core_path.to_string_lossy().into_owned(),
            history_db_path: self.history_path.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    pub fn system(&self, config: IngestConfig) -> System {
        System::new(config).unwrap()
    }

    pub fn core(&self) -> Connection {
        Connection::open(&self.core_path).unwrap()
    }

    pub fn history(&self) -> Connection {
        Connection::open(&self.history_path).unwrap()
    }

    pub fn add_header(&self, sequence: u32) {
        self.core()
            .execute(
                "INSERT INTO ledgerheaders (ledgerhash, prevhash, ledgerseq, closetime)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    format!("hash-{}", sequence),
                    format!("hash-{}", sequence - 1),
                    sequence,
                    CLOSE_TIME_BASE + sequence as i64 * 5
                ],
            )
            .unwrap();
    }

    /// Append a transaction at 1-based `index` of ledger `sequence`.
    pub fn add_tx(&self, sequence: u32, index: u32, source: &str, ops: Vec<Json>, results: Vec<Json>, success: bool) {
        let hash = format!("tx-{}-{}", sequence, index);
        let envelope = json!({
            "source_account": source,
            "fee": 100,
            "sequence": sequence as i64 * 100 + index as i64,
            "memo": { "type": "text", "value": format!("ledger {}", sequence) },
            "operations": ops,
        });
        let result = json!({
            "fee_charged": 100,
            "code": if success { "tx_success" } else { "tx_failed" },
            "operations": results,
        });

        let core = self.core();
        core.execute(
            "INSERT INTO txhistory VALUES (?1, ?2, ?3, ?4, ?5)",
            params![hash, sequence, index, envelope.to_string(), result.to_string()],
        )
        .unwrap();
        core.execute(
            "INSERT INTO txfeehistory VALUES (?1, ?2, ?3, 100)",
            params![hash, sequence, index],
        )
        .unwrap();
    }

    /// A ledger with a create-account, a USD payment and a failed payment.
    pub fn add_standard_ledger(&self, sequence: u32) {
        self.add_header(sequence);
        self.add_tx(
            sequence,
            1,
            SOURCE,
            vec![create_account(&format!("GNEW{}", sequence), 1_000_000_000)],
            vec![success()],
            true,
        );
        self.add_tx(
            sequence,
            2,
            SOURCE,
            vec![payment(DESTINATION, usd(), 50_000_000)],
            vec![success()],
            true,
        );
        self.add_tx(
            sequence,
            3,
            DESTINATION,
            vec![payment(SOURCE, usd(), 1)],
            vec![json!({ "result": "failed", "code": "payment_underfunded" })],
            false,
        );
    }

    /// Issuer account and two USD trustlines in current upstream state.
    pub fn add_usd_state(&self) {
        let core = self.core();
        core.execute(
            "INSERT INTO accounts VALUES (?1, 100000000, 1, 0, 'issuer.example', 2, 1)",
            [ISSUER],
        )
        .unwrap();
        for (holder, balance) in [(SOURCE, 70_000_000i64), (DESTINATION, 30_000_000)] {
            core.execute(
                "INSERT INTO trustlines VALUES (?1, 1, ?2, 'USD', 1000000000, ?3, 1, 1)",
                params![holder, ISSUER, balance],
            )
            .unwrap();
        }
    }

    pub fn count(&self, table: &str) -> i64 {
        self.history()
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
            .unwrap()
    }

    /// Every row of `table`, rendered and sorted, for whole-table comparison.
    pub fn snapshot(&self, table: &str) -> Vec<String> {
        let history = self.history();
        let mut stmt = history.prepare(&format!("SELECT * FROM {}", table)).unwrap();
        let columns = stmt.column_count();
        let mut rows: Vec<String> = stmt
            .query_map([], |row| {
                (0..columns)
                    .map(|i| row.get::<_, rusqlite::types::Value>(i).map(|v| format!("{:?}", v)))
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map(|values| values.join("|"))
            })
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        rows.sort();
        rows
    }

    pub fn marker(&self, name: &str) -> Option<u32> {
        self.core()
            .query_row("SELECT lastread FROM pubsub WHERE resid = ?1", [name], |row| row.get(0))
            .ok()
    }

    pub fn set_marker(&self, name: &str, sequence: u32) {
        self.core()
            .execute("INSERT INTO pubsub VALUES (?1, ?2)", params![name, sequence])
            .unwrap();
    }
}

pub fn usd() -> Json {
    json!({ "type": "credit_alphanum4", "code": "USD", "issuer": ISSUER })
}

pub fn native() -> Json {
    json!({ "type": "native" })
}

pub fn success() -> Json {
    json!({ "result": "success" })
}

pub fn create_account(destination: &str, starting_balance: i64) -> Json {
    json!({ "body": {
        "type": "create_account",
        "destination": destination,
        "starting_balance": starting_balance,
    }})
}

pub fn payment(destination: &str, asset: Json, amount: i64) -> Json {
    json!({ "body": {
        "type": "payment",
        "destination": destination,
        "asset": asset,
        "amount": amount,
    }})
}

pub fn manage_offer(selling: Json, buying: Json, amount: i64) -> Json {
    json!({ "body": {
        "type": "manage_offer",
        "selling": selling,
        "buying": buying,
        "amount": amount,
        "price": { "n": 1, "d": 2 },
    }})
}

pub fn claim(seller: &str, offer_id: i64, sold: Json, amount_sold: i64, bought: Json, amount_bought: i64) -> Json {
    json!({
        "seller_id": seller,
        "offer_id": offer_id,
        "asset_sold": sold,
        "amount_sold": amount_sold,
        "asset_bought": bought,
        "amount_bought": amount_bought,
    })
}
