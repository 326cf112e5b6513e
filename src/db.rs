//! Store handles and schema migrations
//!
//! A `Store` names one SQLite database file. It keeps a single long-lived
//! connection for system-level queries and hands out fresh, independent
//! connections to sessions via `clone_session()`, so a failed session never
//! leaves the long-lived connection mid-transaction.

use crate::error::{IngestError, Result};
use crate::sqlite_pragma::apply_optimized_pragmas;
use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Which side of the ingester a store sits on. Decides how its failures
/// are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    /// The core store ledgers are read from.
    Upstream,
    /// The history store rows are written to.
    Destination,
}

impl StoreRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreRole::Upstream => "core",
            StoreRole::Destination => "history",
        }
    }

    fn error(&self, source: rusqlite::Error) -> IngestError {
        match self {
            StoreRole::Upstream => IngestError::Upstream(source),
            StoreRole::Destination => IngestError::write(self.as_str(), source),
        }
    }
}

pub struct Store {
    role: StoreRole,
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(role: StoreRole, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = open_connection(&path).map_err(|e| role.error(e))?;
        log::info!("📂 Opened {} store: {}", role.as_str(), path.display());

        Ok(Self {
            role,
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn role(&self) -> StoreRole {
        self.role
    }

    pub fn name(&self) -> &'static str {
        self.role.as_str()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection to the same database for one session.
    pub fn clone_session(&self) -> Result<Connection> {
        let conn = open_connection(&self.path).map_err(|e| self.role.error(e))?;
        log::debug!("🔌 Cloned {} store connection", self.name());
        Ok(conn)
    }

    /// Borrow the long-lived connection.
    ///
    /// A poisoned lock still holds a usable connection: rusqlite rolls back
    /// any transaction dropped during the panic.
    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    apply_optimized_pragmas(&conn)?;
    Ok(conn)
}

/// Run schema migrations from SQL files
///
/// Reads all .sql files from `schema_dir`, sorted by file name, and executes
/// them in order. Files must use `IF NOT EXISTS` so the runner is idempotent.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: impl AsRef<Path>) -> Result<()> {
    let schema_path = schema_dir.as_ref();

    if !schema_path.is_dir() {
        return Err(IngestError::Migration(format!(
            "schema directory not found: {}",
            schema_path.display()
        )));
    }

    let mut sql_files: Vec<PathBuf> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort();

    log::info!("🔧 Running schema migrations from: {}", schema_path.display());

    for path in sql_files {
        let filename = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();

        log::debug!("   ├─ Executing: {}", filename);

        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)
            .map_err(|e| IngestError::Migration(format!("{}: {}", filename, e)))?;
    }

    log::info!("✅ Schema migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_clone_session_is_independent() {
        let dir = tempdir().unwrap();
        let store = Store::open(StoreRole::Destination, dir.path().join("nested/h.db")).unwrap();

        store
            .lock()
            .execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();

        let mut clone = store.clone_session().unwrap();
        let tx = clone.transaction().unwrap();
        tx.execute("INSERT INTO t VALUES (2)", []).unwrap();
        drop(tx); // rolled back

        let count: i64 = store
            .lock()
            .query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.name(), "history");
    }

    #[test]
    fn test_open_failures_follow_store_role() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h.db");
        fs::write(&path, vec![0xAB; 4096]).unwrap();

        let err = Store::open(StoreRole::Destination, &path).err().unwrap();
        assert!(err.is_destination(), "unexpected error: {}", err);
        assert!(!err.is_upstream());
        assert!(err.to_string().contains("history"));

        let err = Store::open(StoreRole::Upstream, &path).err().unwrap();
        assert!(err.is_upstream(), "unexpected error: {}", err);
        assert!(!err.is_destination());
    }

    #[test]
    fn test_history_migrations_idempotent() {
        let dir = tempdir().unwrap();
        let mut conn = Connection::open(dir.path().join("h.db")).unwrap();

        run_schema_migrations(&mut conn, "sql/history").unwrap();
        run_schema_migrations(&mut conn, "sql/history").unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND (name LIKE 'history_%' OR name = 'asset_stats')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 10);
    }

    #[test]
    fn test_missing_schema_dir() {
        let dir = tempdir().unwrap();
        let mut conn = Connection::open(dir.path().join("h.db")).unwrap();
        let err = run_schema_migrations(&mut conn, dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, IngestError::Migration(_)));
    }
}
