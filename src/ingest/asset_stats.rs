//! Asset statistics maintainer
//!
//! Collects the assets touched during a session and, at flush time,
//! recomputes each one from current upstream state: trustline balance sum,
//! trustline count, issuer flags and issuer home domain. Nothing is adjusted
//! incrementally. When disabled every method is a no-op and the upstream
//! store is never queried.

use super::batch::{BatchInsertBuilder, Row, Value};
use super::{upstream, TableName, CURRENT_VERSION};
use crate::error::Result;
use crate::ledger::{amount, Asset};
use rusqlite::Connection;
use std::collections::BTreeSet;

struct Tracking {
    pending: BTreeSet<Asset>,
    builder: BatchInsertBuilder,
}

pub struct AssetStats {
    tracking: Option<Tracking>,
    recomputed: usize,
}

impl AssetStats {
    pub fn new(enabled: bool) -> Self {
        let tracking = enabled.then(|| Tracking {
            pending: BTreeSet::new(),
            builder: BatchInsertBuilder::new(TableName::AssetStats),
        });
        Self {
            tracking,
            recomputed: 0,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.tracking.is_some()
    }

    /// Mark `asset` for recomputation. Native is never tracked.
    pub fn add(&mut self, asset: &Asset) {
        if let Some(tracking) = &mut self.tracking {
            if !asset.is_native() {
                tracking.pending.insert(asset.clone());
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.tracking.as_ref().map_or(0, |t| t.pending.len())
    }

    pub fn is_pending(&self, asset: &Asset) -> bool {
        self.tracking
            .as_ref()
            .is_some_and(|t| t.pending.contains(asset))
    }

    /// Assets recomputed over this tracker's lifetime.
    pub fn recomputed(&self) -> usize {
        self.recomputed
    }

    /// Recompute every pending asset from `core` and upsert into `dest`.
    ///
    /// The pending set is emptied first, so a failure drops the set along
    /// with the builder's buffer.
    pub fn update_and_flush(&mut self, core: &Connection, dest: &mut Connection) -> Result<usize> {
        let Some(tracking) = &mut self.tracking else {
            return Ok(0);
        };

        let pending = std::mem::take(&mut tracking.pending);
        for asset in &pending {
            let row = compute(core, asset)?;
            tracking.builder.add(row)?;
            self.recomputed += 1;
        }

        let written = tracking.builder.flush(dest)?;
        if written > 0 {
            log::info!("📊 Updated stats for {} assets", written);
        }
        Ok(written)
    }
}

fn compute(core: &Connection, asset: &Asset) -> Result<Row> {
    let (total, holders) = upstream::trustline_totals(core, asset)?;
    let (flags, home_domain) = upstream::account_settings(core, asset.issuer())?.unwrap_or_default();

    Ok(Row::new()
        .set("id", Value::Asset(asset.clone()))
        .set("amount", amount::format_wide(total))
        .set("num_accounts", holders)
        .set("flags", flags)
        .set("toml", toml_url(&home_domain))
        .set("importer_version", CURRENT_VERSION))
}

fn toml_url(home_domain: &str) -> String {
    if home_domain.is_empty() {
        String::new()
    } else {
        format!("https://{}/.well-known/stellar.toml", home_domain)
    }
}
