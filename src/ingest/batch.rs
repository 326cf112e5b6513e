//! Batch insert builder
//!
//! Accumulates rows for one destination table and writes them in as few
//! multi-row `INSERT`s as SQLite's bound-parameter ceiling allows. The
//! column list is fixed by the first row and never changes afterwards.
//! The row buffer is emptied on every flush, successful or not.

use super::refs::{self, IdMap};
use super::TableName;
use crate::error::{IngestError, Result};
use crate::ledger::Asset;
use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;

/// SQLite's default `SQLITE_MAX_VARIABLE_NUMBER` (3.32+).
pub const MAX_PARAMS: usize = 32_766;

/// A single column value.
///
/// `Account` and `Asset` are references: they are exchanged for the row id
/// in `history_accounts` / `history_assets` when the batch is flushed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Account(String),
    Asset(Asset),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// An ordered set of `column = value` pairs destined for one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.columns.push(column);
        self.values.push(value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

enum BuilderState {
    Uninitialized,
    Initialized {
        columns: Vec<&'static str>,
        insert_prefix: String,
    },
}

pub struct BatchInsertBuilder {
    table: TableName,
    suffix: Option<&'static str>,
    state: BuilderState,
    rows: Vec<Vec<Value>>,
}

impl BatchInsertBuilder {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            suffix: table.insert_suffix(),
            state: BuilderState::Uninitialized,
            rows: Vec::new(),
        }
    }

    pub fn table(&self) -> TableName {
        self.table
    }

    /// Fixed column list, once the first row has been added.
    pub fn columns(&self) -> Option<&[&'static str]> {
        match &self.state {
            BuilderState::Uninitialized => None,
            BuilderState::Initialized { columns, .. } => Some(columns),
        }
    }

    /// Buffered rows not yet flushed.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Buffer one row.
    ///
    /// The first row fixes the column list. Later rows must carry the same
    /// number of values in the same column order.
    pub fn add(&mut self, row: Row) -> Result<()> {
        let Row { columns, values } = row;

        if let BuilderState::Initialized { columns: fixed, .. } = &self.state {
            if values.len() != fixed.len() {
                return Err(IngestError::ArityMismatch {
                    table: self.table.to_string(),
                    expected: fixed.len(),
                    got: values.len(),
                });
            }
            if columns != *fixed {
                return Err(IngestError::ColumnMismatch {
                    table: self.table.to_string(),
                });
            }
        } else {
            self.initialize(columns)?;
        }

        self.rows.push(values);
        Ok(())
    }

    fn initialize(&mut self, columns: Vec<&'static str>) -> Result<()> {
        if columns.is_empty() {
            return Err(IngestError::ArityMismatch {
                table: self.table.to_string(),
                expected: 1,
                got: 0,
            });
        }

        let insert_prefix = format!(
            "INSERT INTO {} ({})",
            self.table,
            columns
                .iter()
                .map(|c| format!("\"{}\"", c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        self.state = BuilderState::Initialized {
            columns,
            insert_prefix,
        };
        Ok(())
    }

    /// Write every buffered row inside one database transaction.
    ///
    /// Returns the number of rows written. The buffer is cleared before any
    /// SQL runs, so a failed flush discards its rows.
    pub fn flush(&mut self, conn: &mut Connection) -> Result<usize> {
        let rows = std::mem::take(&mut self.rows);
        if rows.is_empty() {
            return Ok(0);
        }

        let (columns, insert_prefix) = match &self.state {
            BuilderState::Initialized {
                columns,
                insert_prefix,
            } => (columns, insert_prefix),
            BuilderState::Uninitialized => return Ok(0),
        };

        let table = self.table.as_str();
        let tx = conn.transaction().map_err(|e| IngestError::write(table, e))?;

        let ids = refs::resolve(&tx, &rows)?;

        let rows_per_chunk = (MAX_PARAMS / columns.len()).max(1);
        let row_placeholder = format!("({})", vec!["?"; columns.len()].join(","));

        for chunk in rows.chunks(rows_per_chunk) {
            let mut sql = format!(
                "{} VALUES {}",
                insert_prefix,
                vec![row_placeholder.as_str(); chunk.len()].join(",")
            );
            if let Some(suffix) = self.suffix {
                sql.push(' ');
                sql.push_str(suffix);
            }

            let params = chunk
                .iter()
                .flatten()
                .map(|value| to_sql_value(table, value, &ids))
                .collect::<Result<Vec<_>>>()?;

            let mut stmt = tx
                .prepare_cached(&sql)
                .map_err(|e| IngestError::write(table, e))?;
            stmt.execute(rusqlite::params_from_iter(params))
                .map_err(|e| IngestError::write(table, e))?;
        }

        tx.commit().map_err(|e| IngestError::write(table, e))?;

        log::debug!("✅ Flushed {} rows to {}", rows.len(), table);
        Ok(rows.len())
    }
}

fn to_sql_value(table: &str, value: &Value, ids: &IdMap) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Account(address) => SqlValue::Integer(ids.account(address).ok_or_else(|| {
            IngestError::UnresolvedReference {
                table: table.to_string(),
                reference: address.clone(),
            }
        })?),
        Value::Asset(asset) => SqlValue::Integer(ids.asset(asset).ok_or_else(|| {
            IngestError::UnresolvedReference {
                table: table.to_string(),
                reference: asset.to_string(),
            }
        })?),
    })
}
