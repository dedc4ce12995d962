//! Schema verification and repair, run every time the database is opened.
//!
//! ```text
//! Unverified ──probe──▶ Verified
//!     │
//!     └──missing tables──▶ NeedsRepair ──apply schema──▶ Unverified
//!                              │
//!                              └──already repaired / DDL error──▶ RepairFailed (fatal)
//! ```
//!
//! Repair is attempted at most once per open.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use super::schema::{REQUIRED_TABLES, SCHEMA};
use crate::errors::{Result, VaultError};

/// Where the bootstrap of one database currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    Unverified,
    Verified,
    NeedsRepair { missing: Vec<&'static str> },
    RepairFailed { reason: String },
}

impl BootstrapState {
    /// Advance one step.  `repaired` records whether the schema has
    /// already been applied during this open.
    fn step(self, conn: &Connection, repaired: &mut bool) -> Self {
        match self {
            Self::Unverified => match missing_tables(conn) {
                Ok(missing) if missing.is_empty() => Self::Verified,
                Ok(missing) => Self::NeedsRepair { missing },
                Err(e) => Self::RepairFailed {
                    reason: format!("schema probe failed: {e}"),
                },
            },
            Self::NeedsRepair { missing } if *repaired => Self::RepairFailed {
                reason: format!(
                    "tables still missing after repair: {}",
                    missing.join(", ")
                ),
            },
            Self::NeedsRepair { missing } => {
                if missing.len() == REQUIRED_TABLES.len() {
                    tracing::info!("Initializing vault database schema");
                } else {
                    tracing::warn!(
                        missing = %missing.join(", "),
                        "Vault database is missing tables, repairing"
                    );
                }
                *repaired = true;
                match conn.execute_batch(SCHEMA) {
                    Ok(()) => Self::Unverified,
                    Err(e) => Self::RepairFailed {
                        reason: format!("applying schema failed: {e}"),
                    },
                }
            }
            terminal @ (Self::Verified | Self::RepairFailed { .. }) => terminal,
        }
    }
}

/// Drive the state machine to a terminal state.
pub(crate) fn run(conn: &Connection, path: &Path) -> Result<()> {
    let mut state = BootstrapState::Unverified;
    let mut repaired = false;

    loop {
        state = state.step(conn, &mut repaired);
        match state {
            BootstrapState::Verified => {
                tracing::debug!(path = %path.display(), repaired, "Vault database verified");
                return Ok(());
            }
            BootstrapState::RepairFailed { reason } => {
                tracing::error!(path = %path.display(), %reason, "Vault database repair failed");
                return Err(VaultError::RepairFailed {
                    path: path.to_path_buf(),
                    reason,
                });
            }
            _ => {}
        }
    }
}

/// Probe the current state without changing anything.
pub fn inspect(conn: &Connection) -> BootstrapState {
    let mut repaired = false;
    BootstrapState::Unverified.step(conn, &mut repaired)
}

fn missing_tables(conn: &Connection) -> rusqlite::Result<Vec<&'static str>> {
    let mut stmt =
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        let found: Option<String> = stmt.query_row([*table], |row| row.get(0)).optional()?;
        if found.is_none() {
            missing.push(*table);
        }
    }
    Ok(missing)
}
