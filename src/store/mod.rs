//! Storage module — the vault's SQLite database.
//!
//! This module provides:
//! - The `Database` handle, opened once at process start and passed into
//!   every component that needs storage (`Database`)
//! - Schema verification and repair on open (`bootstrap`)
//! - Entity types (`models`) and the project / environment / variable
//!   repository methods (`projects`)
//!
//! Every public method runs its statements under one connection lock, so
//! single-row reads and upserts are atomic.  Multi-row atomicity is only
//! provided where a caller asks for it through `with_transaction`.

pub mod bootstrap;
pub mod models;
pub mod projects;
mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, Transaction};

use crate::errors::Result;

pub use bootstrap::BootstrapState;
pub use models::{
    AccessToken, Environment, EnvironmentSummary, Organization, Profile, Project, ProjectSummary,
    SystemCredential, VariableDefinition, VariableValue,
};

/// Path label used for in-memory databases in logs and errors.
const IN_MEMORY: &str = ":memory:";

/// Shared handle to the vault database.
///
/// Cloning is cheap; all clones use the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the vault database at `path`.
    ///
    /// Missing tables are recreated from the embedded schema; if that
    /// does not leave a usable database, opening fails with `RepairFailed`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Set restrictive permissions on the database (owner-only).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(path, perms);
        }

        Self::from_connection(conn, path.to_path_buf())
    }

    /// Open a private in-memory database (used by tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, PathBuf::from(IN_MEMORY))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        bootstrap::run(&conn, &path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Location of the database file (`:memory:` for in-memory databases).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.lock();
        Ok(f(&conn)?)
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite mid-statement.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
