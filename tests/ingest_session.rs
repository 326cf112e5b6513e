mod common;

use common::*;
use ledger_ingest::error::IngestError;
use ledger_ingest::ingest::CURRENT_VERSION;
use serde_json::json;

const HISTORY_TABLES: [&str; 10] = [
    "history_ledgers",
    "history_transactions",
    "history_transaction_participants",
    "history_operations",
    "history_operation_participants",
    "history_effects",
    "history_trades",
    "history_accounts",
    "history_assets",
    "asset_stats",
];

#[test]
fn test_single_ledger_range() {
    let fixture = Fixture::new();
    for seq in 4..=6 {
        fixture.add_standard_ledger(seq);
    }
    let system = fixture.system(fixture.config());

    let report = system.run_range(5, 5).unwrap();
    assert_eq!(report.ingested, 1);
    assert!(report.cursor_committed);

    let (sequence, tx_count, failed, op_count, closed_at): (u32, i64, i64, i64, String) = fixture
        .history()
        .query_row(
            "SELECT sequence, transaction_count, failed_transaction_count, operation_count, closed_at
             FROM history_ledgers",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .unwrap();
    assert_eq!(sequence, 5);
    assert_eq!(tx_count, 3);
    assert_eq!(failed, 1);
    assert_eq!(op_count, 2);
    assert_eq!(closed_at, "2017-07-14T02:40:25Z");

    assert_eq!(fixture.count("history_ledgers"), 1);
    assert_eq!(fixture.marker("HISTORY"), Some(5));
}

#[test]
fn test_rows_derived_for_range() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    fixture.add_standard_ledger(6);
    let system = fixture.system(fixture.config());

    let report = system.run_range(5, 6).unwrap();
    assert_eq!(report.ingested, 2);

    assert_eq!(fixture.count("history_ledgers"), 2);
    assert_eq!(fixture.count("history_transactions"), 4);
    assert_eq!(fixture.count("history_transaction_participants"), 8);
    assert_eq!(fixture.count("history_operations"), 4);
    assert_eq!(fixture.count("history_operation_participants"), 8);
    assert_eq!(fixture.count("history_effects"), 10);
    assert_eq!(fixture.count("history_trades"), 0);
    assert_eq!(fixture.count("history_accounts"), 4);
    assert_eq!(fixture.count("history_assets"), 1);
    assert_eq!(fixture.count("asset_stats"), 0);

    let history = fixture.history();
    let stale: i64 = history
        .query_row(
            "SELECT COUNT(*) FROM history_effects WHERE importer_version != ?1",
            [CURRENT_VERSION],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(stale, 0);

    // Effects of the create-account op, in ordinal order.
    let types: Vec<i64> = history
        .prepare(
            "SELECT e.type FROM history_effects e
             JOIN history_operations o ON o.id = e.history_operation_id
             WHERE o.type = 0 AND o.transaction_id IN
                 (SELECT id FROM history_transactions WHERE ledger_sequence = 5)
             ORDER BY e.\"order\"",
        )
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(types, vec![0, 3, 10]);

    let (memo, fee): (String, i64) = history
        .query_row(
            "SELECT memo, fee_paid FROM history_transactions ORDER BY id LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(memo, "ledger 5");
    assert_eq!(fee, 100);
}

#[test]
fn test_replay_with_clear_is_idempotent() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    fixture.add_standard_ledger(6);
    fixture.add_usd_state();
    let mut config = fixture.config();
    config.enable_asset_stats = true;
    let system = fixture.system(config);

    system.run_range(5, 6).unwrap();
    let first: Vec<_> = HISTORY_TABLES.iter().map(|t| fixture.snapshot(t)).collect();

    let report = system.new_session(5, 6).unwrap().clear_existing(true).run();
    assert!(report.is_success(), "{:?}", report.err());
    assert!(report.cleared_rows > 0);

    let second: Vec<_> = HISTORY_TABLES.iter().map(|t| fixture.snapshot(t)).collect();
    assert_eq!(first, second);
    assert_eq!(system.metrics().clear_ledger.count(), 1);
}

#[test]
fn test_replay_without_clear_fails_on_destination() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    let system = fixture.system(fixture.config());

    system.run_range(5, 5).unwrap();
    let err = system.run_range(5, 5).unwrap_err();

    assert!(err.is_destination(), "unexpected error: {}", err);
    assert_eq!(fixture.count("history_ledgers"), 1);
    assert_eq!(fixture.marker("HISTORY"), Some(5));
}

#[test]
fn test_second_session_is_busy() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    let system = fixture.system(fixture.config());

    let running = system.new_session(5, 5).unwrap();
    assert!(system.is_running());

    let started = std::time::Instant::now();
    let busy = system.new_session(5, 5).err().unwrap();
    assert!(matches!(busy, IngestError::Busy));
    assert!(started.elapsed() < std::time::Duration::from_secs(1));

    let report = running.run();
    assert!(report.is_success());
    assert!(!system.is_running());
    assert!(system.new_session(5, 5).is_ok());
}

#[test]
fn test_invalid_range_releases_lock() {
    let fixture = Fixture::new();
    let system = fixture.system(fixture.config());

    let err = system.new_session(6, 5).err().unwrap();
    assert!(matches!(err, IngestError::InvalidRange { first: 6, last: 5 }));
    assert!(!system.is_running());
}

#[test]
fn test_upstream_failure_keeps_earlier_ledgers() {
    let fixture = Fixture::new();
    for seq in [5, 6, 8, 9, 10] {
        fixture.add_standard_ledger(seq);
    }
    fixture.set_marker("HISTORY", 4);
    let system = fixture.system(fixture.config());

    let report = system.new_session(5, 10).unwrap().run();

    assert!(matches!(report.err(), Some(IngestError::MissingLedger(7))));
    assert_eq!(report.ingested, 2);
    assert!(!report.cursor_committed);

    let sequences: Vec<u32> = fixture
        .history()
        .prepare("SELECT sequence FROM history_ledgers ORDER BY sequence")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(sequences, vec![5, 6]);

    assert_eq!(fixture.marker("HISTORY"), Some(4));
    assert_eq!(system.cursor_marker().unwrap(), Some(4));
    assert_eq!(system.pending_range().unwrap(), Some((5, 10)));
}

#[test]
fn test_asset_touched_twice_recomputed_once() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    fixture.add_standard_ledger(6);
    fixture.add_usd_state();
    let mut config = fixture.config();
    config.enable_asset_stats = true;
    let system = fixture.system(config);

    let report = system.run_range(5, 6).unwrap();
    assert_eq!(report.asset_stats_written, 1);

    let (amount, holders, flags, toml): (String, i64, i64, String) = fixture
        .history()
        .query_row(
            "SELECT s.amount, s.num_accounts, s.flags, s.toml FROM asset_stats s
             JOIN history_assets a ON a.id = s.id
             WHERE a.asset_code = 'USD' AND a.asset_issuer = ?1",
            [ISSUER],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(amount, "10.0000000");
    assert_eq!(holders, 2);
    assert_eq!(flags, 2);
    assert_eq!(toml, "https://issuer.example/.well-known/stellar.toml");
}

#[test]
fn test_asset_stats_disabled_writes_nothing() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    fixture.add_usd_state();
    let system = fixture.system(fixture.config());

    let report = system.run_range(5, 5).unwrap();

    assert_eq!(report.asset_stats_written, 0);
    assert_eq!(fixture.count("asset_stats"), 0);
    // one load per ledger, nothing else timed against upstream
    assert_eq!(system.metrics().load_ledger.count(), 1);
}

#[test]
fn test_failed_transactions_opt_in() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    let mut config = fixture.config();
    config.ingest_failed_transactions = true;
    let system = fixture.system(config);

    system.run_range(5, 5).unwrap();

    assert_eq!(fixture.count("history_transactions"), 3);
    assert_eq!(fixture.count("history_operations"), 3);
    assert_eq!(fixture.count("history_effects"), 5);

    let failed: i64 = fixture
        .history()
        .query_row(
            "SELECT COUNT(*) FROM history_transactions WHERE successful = 0",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(failed, 1);
}

#[test]
fn test_skip_cursor_update() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    let mut config = fixture.config();
    config.skip_cursor_update = true;
    let system = fixture.system(config);

    let report = system.run_range(5, 5).unwrap();

    assert!(!report.cursor_committed);
    assert_eq!(fixture.marker("HISTORY"), None);
    assert_eq!(fixture.count("history_ledgers"), 1);
}

#[test]
fn test_cursor_names_are_independent() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    fixture.add_standard_ledger(6);

    let system = fixture.system(fixture.config());
    system.run_range(5, 6).unwrap();
    assert_eq!(system.pending_range().unwrap(), None);

    let mut other = fixture.config();
    other.cursor_name = "AUDIT".to_string();
    other.skip_cursor_update = false;
    let audit = fixture.system(other);
    assert_eq!(audit.cursor_marker().unwrap(), None);
    assert_eq!(audit.pending_range().unwrap(), Some((5, 6)));
    assert_eq!(fixture.marker("HISTORY"), Some(6));
}

#[test]
fn test_offer_claims_become_trades() {
    let fixture = Fixture::new();
    fixture.add_header(5);
    fixture.add_tx(
        5,
        1,
        SOURCE,
        vec![manage_offer(native(), usd(), 20_000_000)],
        vec![json!({
            "result": "offer_claims",
            "claims": [claim("GSELLER", 77, usd(), 10_000_000, native(), 20_000_000)],
        })],
        true,
    );
    let system = fixture.system(fixture.config());

    system.run_range(5, 5).unwrap();

    assert_eq!(fixture.count("history_trades"), 1);
    assert_eq!(fixture.count("history_effects"), 2);

    let (offer_id, seller, base_amount, counter_amount): (i64, String, i64, i64) = fixture
        .history()
        .query_row(
            "SELECT t.offer_id, a.address, t.base_amount, t.counter_amount
             FROM history_trades t JOIN history_accounts a ON a.id = t.base_account_id",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .unwrap();
    assert_eq!(offer_id, 77);
    assert_eq!(seller, "GSELLER");
    assert_eq!(base_amount, 10_000_000);
    assert_eq!(counter_amount, 20_000_000);

    let traders: Vec<String> = fixture
        .history()
        .prepare(
            "SELECT a.address FROM history_effects e
             JOIN history_accounts a ON a.id = e.history_account_id
             WHERE e.type = 33 ORDER BY e.\"order\"",
        )
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();
    assert_eq!(traders, vec![SOURCE.to_string(), "GSELLER".to_string()]);
}

fn op(body: serde_json::Value) -> serde_json::Value {
    json!({ "body": body })
}

#[test]
fn test_effects_for_every_operation_kind() {
    let fixture = Fixture::new();
    fixture.add_header(5);

    let ops = vec![
        op(json!({
            "type": "path_payment",
            "destination": DESTINATION,
            "send_asset": native(),
            "send_max": 100_000_000,
            "dest_asset": usd(),
            "dest_amount": 50_000_000,
        })),
        op(json!({ "type": "account_merge", "destination": DESTINATION })),
        op(json!({ "type": "inflation" })),
        op(json!({
            "type": "set_options",
            "home_domain": "source.example",
            "set_flags": 1,
            "low_threshold": 1,
            "master_weight": 0,
            "signer": { "key": "GSIGNER", "weight": 0 },
        })),
        op(json!({
            "type": "set_options",
            "master_weight": 2,
            "signer": { "key": "GSIGNER", "weight": 1 },
        })),
        op(json!({ "type": "change_trust", "line": usd(), "limit": 0 })),
        op(json!({ "type": "change_trust", "line": usd(), "limit": 1_000_000_000 })),
        op(json!({ "type": "allow_trust", "trustor": DESTINATION, "asset_code": "USD", "authorize": true })),
        op(json!({ "type": "allow_trust", "trustor": DESTINATION, "asset_code": "USD", "authorize": false })),
        op(json!({ "type": "manage_data", "name": "config" })),
        op(json!({ "type": "manage_data", "name": "config", "value": "AQID" })),
        op(json!({ "type": "bump_sequence", "bump_to": 900 })),
        op(json!({
            "type": "create_passive_offer",
            "selling": native(),
            "buying": usd(),
            "amount": 10,
            "price": { "n": 1, "d": 1 },
        })),
    ];
    let results = vec![
        json!({
            "result": "path_payment",
            "claims": [claim("GSELLER", 9, usd(), 50_000_000, native(), 80_000_000)],
            "source_amount": 80_000_000,
        }),
        json!({ "result": "account_merge", "source_balance": 1_000_000 }),
        json!({ "result": "inflation", "payouts": [{ "destination": DESTINATION, "amount": 10 }] }),
        success(),
        success(),
        success(),
        success(),
        success(),
        success(),
        success(),
        success(),
        success(),
        json!({ "result": "offer_claims", "claims": [] }),
    ];
    fixture.add_tx(5, 1, SOURCE, ops, results, true);
    let system = fixture.system(fixture.config());

    system.run_range(5, 5).unwrap();

    let effects: Vec<(i64, i64, i64)> = fixture
        .history()
        .prepare(
            "SELECT o.application_order, e.\"order\", e.type FROM history_effects e
             JOIN history_operations o ON o.id = e.history_operation_id
             ORDER BY o.id, e.\"order\"",
        )
        .unwrap()
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap();

    assert_eq!(
        effects,
        vec![
            // path payment: credit, both sides of the crossed offer, debit
            (1, 1, 2),
            (1, 2, 33),
            (1, 3, 33),
            (1, 4, 3),
            // account merge: debit, credit, removal
            (2, 1, 3),
            (2, 2, 2),
            (2, 3, 1),
            // inflation payout
            (3, 1, 2),
            // home domain, flags, thresholds, master key removed, signer removed
            (4, 1, 5),
            (4, 2, 6),
            (4, 3, 4),
            (4, 4, 11),
            (4, 5, 11),
            // master key updated, signer created
            (5, 1, 12),
            (5, 2, 10),
            (6, 1, 21),
            (7, 1, 22),
            (8, 1, 23),
            (9, 1, 24),
            (10, 1, 41),
            (11, 1, 42),
            (12, 1, 43),
        ]
    );
    assert_eq!(fixture.count("history_operations"), 13);

    let (offer_id, seller, base_code, base_amount, counter_amount): (i64, String, String, i64, i64) = fixture
        .history()
        .query_row(
            "SELECT t.offer_id, a.address, s.asset_code, t.base_amount, t.counter_amount
             FROM history_trades t
             JOIN history_accounts a ON a.id = t.base_account_id
             JOIN history_assets s ON s.id = t.base_asset_id",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )
        .unwrap();
    assert_eq!(fixture.count("history_trades"), 1);
    assert_eq!(offer_id, 9);
    assert_eq!(seller, "GSELLER");
    assert_eq!(base_code, "USD");
    assert_eq!(base_amount, 50_000_000);
    assert_eq!(counter_amount, 80_000_000);
}

#[test]
fn test_operation_order_beyond_id_layout_fails() {
    let fixture = Fixture::new();
    fixture.add_header(5);
    let ops = (0..4096).map(|i| op(json!({ "type": "bump_sequence", "bump_to": i }))).collect();
    let results = (0..4096).map(|_| success()).collect();
    fixture.add_tx(5, 1, SOURCE, ops, results, true);
    let system = fixture.system(fixture.config());

    let report = system.new_session(5, 5).unwrap().run();

    assert!(
        matches!(
            report.err(),
            Some(IngestError::IdOutOfRange { ledger: 5, transaction: 1, operation: 4096 })
        ),
        "unexpected outcome: {:?}",
        report.err()
    );
    assert_eq!(fixture.count("history_operations"), 0);
    assert_eq!(fixture.marker("HISTORY"), None);
}

#[test]
fn test_flush_failure_keeps_read_failure() {
    let fixture = Fixture::new();
    fixture.add_standard_ledger(5);
    let system = fixture.system(fixture.config());
    system.run_range(5, 5).unwrap();

    fixture.add_standard_ledger(6);
    fixture.add_standard_ledger(8);
    let report = system.new_session(5, 8).unwrap().run();

    assert!(report.err().is_some_and(IngestError::is_destination), "{:?}", report.err());
    assert!(matches!(report.read_err(), Some(IngestError::MissingLedger(7))));
    assert!(!report.cursor_committed);
    assert_eq!(fixture.marker("HISTORY"), Some(5));
}
