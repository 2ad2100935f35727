//! Explicitly constructed SQLite storage handle.
//!
//! A [`Store`] owns one connection behind a mutex and is cheap to clone; the
//! loader and the query service each hold a clone of the same handle.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use etl_core::error::Result;
use rusqlite::{params, Connection};
use tracing::debug;

/// Relation holding the derived daily records.
pub const TABLE_NAME: &str = "covid_data";

/// Relation the loader fills before swapping it into place.
pub const STAGING_TABLE_NAME: &str = "covid_data_staging";

/// Default wait on a locked database before an operation fails.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// `CREATE TABLE` statement for the derived relation under `name`.
///
/// `name` is always one of the constants above, never caller input.
pub(crate) fn create_table_sql(name: &str) -> String {
    format!(
        "CREATE TABLE {name} (
            country          TEXT    NOT NULL,
            date             TEXT    NOT NULL,
            cases            INTEGER NOT NULL,
            deaths           INTEGER NOT NULL,
            recovered        INTEGER NOT NULL,
            new_cases        INTEGER NOT NULL,
            new_deaths       INTEGER NOT NULL,
            new_recovered    INTEGER NOT NULL,
            growth_rate_pct  REAL    NOT NULL,
            new_cases_7day   INTEGER NOT NULL,
            new_deaths_7day  INTEGER NOT NULL,
            PRIMARY KEY (country, date)
        )"
    )
}

/// Whether the derived relation exists on `conn`.
pub(crate) fn table_exists(conn: &Connection) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![TABLE_NAME],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Whether the derived relation exists on `conn` and is non-empty.
pub(crate) fn table_populated(conn: &Connection) -> Result<bool> {
    if !table_exists(conn)? {
        return Ok(false);
    }
    let populated: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {TABLE_NAME})"),
        [],
        |row| row.get(0),
    )?;
    Ok(populated)
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// Shared handle to the SQLite database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    location: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("location", &self.location)
            .finish()
    }
}

impl Store {
    /// Open or create the database at `path`.
    ///
    /// Parent directories are created as needed. `busy_timeout` bounds how
    /// long any statement waits on a lock held by another connection.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        debug!("Opened store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: None,
        })
    }

    /// File backing this store, `None` for in-memory stores.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// `true` once a load has created the derived relation, even if empty.
    pub fn has_table(&self) -> Result<bool> {
        table_exists(&self.lock())
    }

    /// `true` when the derived relation exists and holds at least one row.
    pub fn has_data(&self) -> Result<bool> {
        table_populated(&self.lock())
    }

    /// Number of rows in the derived relation (0 when it does not exist).
    pub fn row_count(&self) -> Result<u64> {
        let conn = self.lock();
        if !table_exists(&conn)? {
            return Ok(0);
        }
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {TABLE_NAME}"),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Exclusive access to the connection.
    ///
    /// Holding the guard keeps every other reader and writer out, which is
    /// what the loader relies on during its replace.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
