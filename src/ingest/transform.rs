//! Ledger bundle → history rows
//!
//! Pure derivation: given a transaction (and an operation index) this module
//! decides which rows exist and pushes them through `Ingestion`. Effects are
//! derived from the operation and its result alone; there is no prior-state
//! lookup, so a replay of the same ledger derives identical rows.

use super::asset_stats::AssetStats;
use super::ingestion::{EffectIngestion, EffectType, Ingestion};
use crate::error::{IngestError, Result};
use crate::ledger::{
    amount, toid::Toid, Asset, ClaimOfferAtom, LedgerBundle, Operation, OperationBody,
    OperationResult, Transaction,
};
use serde_json::{json, Map, Value as Json};
use std::collections::HashSet;

/// Account flag bits and the names used in details JSON.
const ACCOUNT_FLAGS: [(u32, &str); 3] = [
    (1, "auth_required"),
    (2, "auth_revocable"),
    (4, "auth_immutable"),
];

fn checked_id(toid: Toid) -> Result<i64> {
    toid.checked_i64().ok_or(IngestError::IdOutOfRange {
        ledger: toid.ledger,
        transaction: toid.transaction,
        operation: toid.operation,
    })
}

pub fn transaction_id(tx: &Transaction) -> Result<i64> {
    checked_id(Toid::new(tx.ledger_sequence, tx.index, 0))
}

/// Id of the operation at 0-based `index` in `tx`. Fails when the
/// transaction holds more operations than the id layout can number.
pub fn operation_id(tx: &Transaction, index: usize) -> Result<i64> {
    let order = u32::try_from(index + 1).unwrap_or(u32::MAX);
    checked_id(Toid::new(tx.ledger_sequence, tx.index, order))
}

/// Transaction row and its participants. Returns the transaction id.
pub fn transaction(dest: &mut Ingestion, bundle: &LedgerBundle, tx: &Transaction) -> Result<i64> {
    let id = transaction_id(tx)?;
    let fee_paid = bundle
        .fee_for(tx.index)
        .map_or(tx.result.fee_charged, |fee| fee.fee_charged);

    dest.transaction(id, tx, fee_paid)?;
    dest.transaction_participants(id, &transaction_participants(tx))?;
    Ok(id)
}

/// Operation row, participants, touched assets and, for successful
/// transactions, effects and trades.
pub fn operation(
    dest: &mut Ingestion,
    stats: &mut AssetStats,
    closed_at: &str,
    tx: &Transaction,
    index: usize,
) -> Result<()> {
    let Some(op) = tx.envelope.operations.get(index) else {
        return Ok(());
    };
    let id = operation_id(tx, index)?;
    let source = tx.operation_source(op);
    let result = tx.operation_result(index);

    dest.operation(
        id,
        transaction_id(tx)?,
        index as u32 + 1,
        op.body.type_code(),
        &details(op, source, result),
        source,
    )?;
    dest.operation_participants(id, &operation_participants(op, source, result))?;

    for asset in operation_assets(op, source) {
        dest.asset(&asset)?;
        stats.add(&asset);
    }

    if !tx.successful() {
        return Ok(());
    }

    let mut effects = EffectIngestion::new(id);
    operation_effects(dest, &mut effects, op, source, result)?;

    for (order, claim) in result.map(OperationResult::claims).unwrap_or_default().iter().enumerate() {
        dest.trade(id, order as u32 + 1, closed_at, source, claim)?;
        stats.add(&claim.asset_sold);
        stats.add(&claim.asset_bought);
    }

    Ok(())
}

fn dedup(accounts: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    accounts
        .into_iter()
        .filter(|account| seen.insert(account.clone()))
        .collect()
}

/// Accounts involved in an operation, source first.
pub fn operation_participants(
    op: &Operation,
    source: &str,
    result: Option<&OperationResult>,
) -> Vec<String> {
    let mut accounts = vec![source.to_string()];

    match &op.body {
        OperationBody::CreateAccount { destination, .. }
        | OperationBody::Payment { destination, .. }
        | OperationBody::PathPayment { destination, .. }
        | OperationBody::AccountMerge { destination } => accounts.push(destination.clone()),
        OperationBody::AllowTrust { trustor, .. } => accounts.push(trustor.clone()),
        OperationBody::Inflation => {
            if let Some(OperationResult::Inflation { payouts }) = result {
                accounts.extend(payouts.iter().map(|p| p.destination.clone()));
            }
        }
        _ => {}
    }

    dedup(accounts)
}

/// Accounts involved in a transaction: its source and every operation's
/// participants.
pub fn transaction_participants(tx: &Transaction) -> Vec<String> {
    let mut accounts = vec![tx.source_account().to_string()];
    for (index, op) in tx.envelope.operations.iter().enumerate() {
        let source = tx.operation_source(op);
        accounts.extend(operation_participants(op, source, tx.operation_result(index)));
    }
    dedup(accounts)
}

/// Non-native assets an operation names.
pub fn operation_assets(op: &Operation, source: &str) -> Vec<Asset> {
    let assets = match &op.body {
        OperationBody::Payment { asset, .. } => vec![asset.clone()],
        OperationBody::PathPayment {
            send_asset,
            dest_asset,
            path,
            ..
        } => {
            let mut assets = vec![send_asset.clone(), dest_asset.clone()];
            assets.extend(path.iter().cloned());
            assets
        }
        OperationBody::ManageOffer { selling, buying, .. }
        | OperationBody::CreatePassiveOffer { selling, buying, .. } => {
            vec![selling.clone(), buying.clone()]
        }
        OperationBody::ChangeTrust { line, .. } => vec![line.clone()],
        OperationBody::AllowTrust { asset_code, .. } => vec![Asset::credit(asset_code.as_str(), source)],
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    assets
        .into_iter()
        .filter(|asset| !asset.is_native() && seen.insert(asset.clone()))
        .collect()
}

fn asset_fields(asset: &Asset, prefix: &str) -> Map<String, Json> {
    let mut map = Map::new();
    asset.write_details(&mut map, prefix);
    map
}

fn with_asset(mut details: Json, asset: &Asset, prefix: &str) -> Json {
    if let Json::Object(map) = &mut details {
        asset.write_details(map, prefix);
    }
    details
}

fn flag_codes(flags: u32) -> (Vec<u32>, Vec<String>) {
    ACCOUNT_FLAGS
        .iter()
        .filter(|(bit, _)| flags & bit != 0)
        .map(|(bit, name)| (*bit, name.to_string()))
        .unzip()
}

/// JSON stored in `history_operations.details`.
pub fn details(op: &Operation, source: &str, result: Option<&OperationResult>) -> Json {
    match &op.body {
        OperationBody::CreateAccount {
            destination,
            starting_balance,
        } => json!({
            "funder": source,
            "account": destination,
            "starting_balance": amount::format(*starting_balance),
        }),
        OperationBody::Payment {
            destination,
            asset,
            amount: paid,
        } => with_asset(
            json!({ "from": source, "to": destination, "amount": amount::format(*paid) }),
            asset,
            "",
        ),
        OperationBody::PathPayment {
            destination,
            send_asset,
            send_max,
            dest_asset,
            dest_amount,
            path,
        } => {
            let mut details = json!({
                "from": source,
                "to": destination,
                "amount": amount::format(*dest_amount),
                "source_max": amount::format(*send_max),
                "path": path.iter().map(|a| Json::Object(asset_fields(a, ""))).collect::<Vec<_>>(),
            });
            if let Some(OperationResult::PathPayment { source_amount, .. }) = result {
                details["source_amount"] = amount::format(*source_amount).into();
            }
            let details = with_asset(details, dest_asset, "");
            with_asset(details, send_asset, "source_")
        }
        OperationBody::ManageOffer {
            selling,
            buying,
            amount: offered,
            price,
            offer_id,
        } => {
            let details = json!({
                "offer_id": offer_id,
                "amount": amount::format(*offered),
                "price": price.to_decimal_string(),
                "price_r": { "n": price.n, "d": price.d },
            });
            with_asset(with_asset(details, buying, "buying_"), selling, "selling_")
        }
        OperationBody::CreatePassiveOffer {
            selling,
            buying,
            amount: offered,
            price,
        } => {
            let details = json!({
                "amount": amount::format(*offered),
                "price": price.to_decimal_string(),
                "price_r": { "n": price.n, "d": price.d },
            });
            with_asset(with_asset(details, buying, "buying_"), selling, "selling_")
        }
        OperationBody::SetOptions {
            inflation_dest,
            clear_flags,
            set_flags,
            master_weight,
            low_threshold,
            med_threshold,
            high_threshold,
            home_domain,
            signer,
        } => {
            let mut map = Map::new();
            if let Some(dest) = inflation_dest {
                map.insert("inflation_dest".into(), dest.as_str().into());
            }
            if let Some(flags) = set_flags {
                let (codes, names) = flag_codes(*flags);
                map.insert("set_flags".into(), codes.into());
                map.insert("set_flags_s".into(), names.into());
            }
            if let Some(flags) = clear_flags {
                let (codes, names) = flag_codes(*flags);
                map.insert("clear_flags".into(), codes.into());
                map.insert("clear_flags_s".into(), names.into());
            }
            if let Some(weight) = master_weight {
                map.insert("master_key_weight".into(), (*weight).into());
            }
            if let Some(t) = low_threshold {
                map.insert("low_threshold".into(), (*t).into());
            }
            if let Some(t) = med_threshold {
                map.insert("med_threshold".into(), (*t).into());
            }
            if let Some(t) = high_threshold {
                map.insert("high_threshold".into(), (*t).into());
            }
            if let Some(domain) = home_domain {
                map.insert("home_domain".into(), domain.as_str().into());
            }
            if let Some(signer) = signer {
                map.insert("signer_key".into(), signer.key.as_str().into());
                map.insert("signer_weight".into(), signer.weight.into());
            }
            Json::Object(map)
        }
        OperationBody::ChangeTrust { line, limit } => with_asset(
            json!({
                "trustor": source,
                "trustee": line.issuer(),
                "limit": amount::format(*limit),
            }),
            line,
            "",
        ),
        OperationBody::AllowTrust {
            trustor,
            asset_code,
            authorize,
        } => with_asset(
            json!({ "trustor": trustor, "trustee": source, "authorize": authorize }),
            &Asset::credit(asset_code.as_str(), source),
            "",
        ),
        OperationBody::AccountMerge { destination } => json!({
            "account": source,
            "into": destination,
        }),
        OperationBody::Inflation => json!({}),
        OperationBody::ManageData { name, value } => json!({
            "name": name,
            "value": value,
        }),
        OperationBody::BumpSequence { bump_to } => json!({
            "bump_to": bump_to.to_string(),
        }),
    }
}

fn amount_details(value: i64, asset: &Asset) -> Json {
    with_asset(json!({ "amount": amount::format(value) }), asset, "")
}

fn operation_effects(
    dest: &mut Ingestion,
    effects: &mut EffectIngestion,
    op: &Operation,
    source: &str,
    result: Option<&OperationResult>,
) -> Result<()> {
    match &op.body {
        OperationBody::CreateAccount {
            destination,
            starting_balance,
        } => {
            effects.add(
                dest,
                destination,
                EffectType::AccountCreated,
                json!({ "starting_balance": amount::format(*starting_balance) }),
            )?;
            effects.add(
                dest,
                source,
                EffectType::AccountDebited,
                amount_details(*starting_balance, &Asset::Native),
            )?;
            effects.add(
                dest,
                destination,
                EffectType::SignerCreated,
                json!({ "public_key": destination, "weight": 1 }),
            )?;
        }
        OperationBody::Payment {
            destination,
            asset,
            amount: paid,
        } => {
            effects.add(dest, destination, EffectType::AccountCredited, amount_details(*paid, asset))?;
            effects.add(dest, source, EffectType::AccountDebited, amount_details(*paid, asset))?;
        }
        OperationBody::PathPayment {
            destination,
            send_asset,
            send_max,
            dest_asset,
            dest_amount,
            ..
        } => {
            effects.add(
                dest,
                destination,
                EffectType::AccountCredited,
                amount_details(*dest_amount, dest_asset),
            )?;
            let claims = result.map(OperationResult::claims).unwrap_or_default();
            trade_effects(dest, effects, source, claims)?;

            let spent = match result {
                Some(OperationResult::PathPayment { source_amount, .. }) => *source_amount,
                _ => *send_max,
            };
            effects.add(dest, source, EffectType::AccountDebited, amount_details(spent, send_asset))?;
        }
        OperationBody::ManageOffer { .. } | OperationBody::CreatePassiveOffer { .. } => {
            let claims = result.map(OperationResult::claims).unwrap_or_default();
            trade_effects(dest, effects, source, claims)?;
        }
        OperationBody::SetOptions {
            clear_flags,
            set_flags,
            master_weight,
            low_threshold,
            med_threshold,
            high_threshold,
            home_domain,
            signer,
            ..
        } => {
            if let Some(domain) = home_domain {
                effects.add(
                    dest,
                    source,
                    EffectType::AccountHomeDomainUpdated,
                    json!({ "home_domain": domain }),
                )?;
            }

            if set_flags.is_some() || clear_flags.is_some() {
                let mut map = Map::new();
                for (bit, name) in ACCOUNT_FLAGS {
                    let key = format!("{}_flag", name);
                    if set_flags.is_some_and(|flags| flags & bit != 0) {
                        map.insert(key, true.into());
                    } else if clear_flags.is_some_and(|flags| flags & bit != 0) {
                        map.insert(key, false.into());
                    }
                }
                effects.add(dest, source, EffectType::AccountFlagsUpdated, Json::Object(map))?;
            }

            if low_threshold.is_some() || med_threshold.is_some() || high_threshold.is_some() {
                let mut map = Map::new();
                for (key, value) in [
                    ("low_threshold", low_threshold),
                    ("med_threshold", med_threshold),
                    ("high_threshold", high_threshold),
                ] {
                    if let Some(value) = value {
                        map.insert(key.into(), (*value).into());
                    }
                }
                effects.add(dest, source, EffectType::AccountThresholdsUpdated, Json::Object(map))?;
            }

            if let Some(weight) = master_weight {
                let effect = if *weight == 0 {
                    EffectType::SignerRemoved
                } else {
                    EffectType::SignerUpdated
                };
                effects.add(dest, source, effect, json!({ "public_key": source, "weight": weight }))?;
            }

            if let Some(signer) = signer {
                let effect = if signer.weight == 0 {
                    EffectType::SignerRemoved
                } else {
                    EffectType::SignerCreated
                };
                effects.add(
                    dest,
                    source,
                    effect,
                    json!({ "public_key": signer.key, "weight": signer.weight }),
                )?;
            }
        }
        OperationBody::ChangeTrust { line, limit } => {
            let effect = if *limit == 0 {
                EffectType::TrustlineRemoved
            } else {
                EffectType::TrustlineUpdated
            };
            let details = with_asset(json!({ "limit": amount::format(*limit) }), line, "");
            effects.add(dest, source, effect, details)?;
        }
        OperationBody::AllowTrust {
            trustor,
            asset_code,
            authorize,
        } => {
            let effect = if *authorize {
                EffectType::TrustlineAuthorized
            } else {
                EffectType::TrustlineDeauthorized
            };
            let asset = Asset::credit(asset_code.as_str(), source);
            let mut map = Map::new();
            map.insert("trustor".into(), trustor.as_str().into());
            map.insert("asset_type".into(), asset.asset_type().into());
            map.insert("asset_code".into(), asset_code.as_str().into());
            effects.add(dest, source, effect, Json::Object(map))?;
        }
        OperationBody::AccountMerge { destination } => {
            if let Some(OperationResult::AccountMerge { source_balance }) = result {
                let moved = amount_details(*source_balance, &Asset::Native);
                effects.add(dest, source, EffectType::AccountDebited, moved.clone())?;
                effects.add(dest, destination, EffectType::AccountCredited, moved)?;
            }
            effects.add(dest, source, EffectType::AccountRemoved, json!({}))?;
        }
        OperationBody::Inflation => {
            if let Some(OperationResult::Inflation { payouts }) = result {
                for payout in payouts {
                    effects.add(
                        dest,
                        &payout.destination,
                        EffectType::AccountCredited,
                        amount_details(payout.amount, &Asset::Native),
                    )?;
                }
            }
        }
        OperationBody::ManageData { name, value } => match value {
            None => effects.add(dest, source, EffectType::DataRemoved, json!({ "name": name }))?,
            Some(value) => effects.add(
                dest,
                source,
                EffectType::DataUpdated,
                json!({ "name": name, "value": value }),
            )?,
        },
        OperationBody::BumpSequence { bump_to } => {
            effects.add(
                dest,
                source,
                EffectType::SequenceBumped,
                json!({ "new_seq": bump_to }),
            )?;
        }
    }

    Ok(())
}

/// Two `trade` effects per claimed offer: one for the taker, one for the
/// offer's owner, each from its own point of view.
fn trade_effects(
    dest: &mut Ingestion,
    effects: &mut EffectIngestion,
    buyer: &str,
    claims: &[ClaimOfferAtom],
) -> Result<()> {
    for claim in claims {
        let taker = with_asset(
            with_asset(
                json!({
                    "offer_id": claim.offer_id,
                    "seller": claim.seller_id,
                    "bought_amount": amount::format(claim.amount_sold),
                    "sold_amount": amount::format(claim.amount_bought),
                }),
                &claim.asset_sold,
                "bought_",
            ),
            &claim.asset_bought,
            "sold_",
        );
        effects.add(dest, buyer, EffectType::Trade, taker)?;

        let owner = with_asset(
            with_asset(
                json!({
                    "offer_id": claim.offer_id,
                    "seller": buyer,
                    "bought_amount": amount::format(claim.amount_bought),
                    "sold_amount": amount::format(claim.amount_sold),
                }),
                &claim.asset_bought,
                "bought_",
            ),
            &claim.asset_sold,
            "sold_",
        );
        effects.add(dest, &claim.seller_id, EffectType::Trade, owner)?;
    }
    Ok(())
}
