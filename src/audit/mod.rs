//! Audit log — operation history in the vault database.
//!
//! Records token issue/revoke, password changes, variable writes and RPC
//! value reads in the `audit_log` table.  Entries never contain values,
//! raw tokens or key material.
//!
//! Designed for graceful degradation: if a write fails, the operation that
//! triggered it still succeeds.

use chrono::{DateTime, Utc};

use crate::errors::{Result, VaultError};
use crate::store::Database;

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub operation: String,
    /// What the operation touched, e.g. `Acme/prod` or a token name.
    pub subject: Option<String>,
    pub details: Option<String>,
}

/// Audit log backed by the vault database.
#[derive(Clone)]
pub struct AuditLog {
    db: Database,
}

impl AuditLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record an operation. Fire-and-forget: a failed write is only traced.
    pub fn log(&self, operation: &str, subject: Option<&str>, details: Option<&str>) {
        let now = Utc::now().to_rfc3339();
        let result = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_log (timestamp, operation, subject, details)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![now, operation, subject, details],
            )
        });
        if let Err(e) = result {
            tracing::debug!(operation, error = %e, "Audit write failed");
        }
    }

    /// Query recent audit entries.
    ///
    /// - `limit`: maximum number of entries to return (most recent first).
    /// - `since`: if provided, only return entries newer than this timestamp.
    pub fn query(&self, limit: usize, since: Option<DateTime<Utc>>) -> Result<Vec<AuditEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let (sql, params): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = match since {
            Some(ref ts) => (
                "SELECT id, timestamp, operation, subject, details
                 FROM audit_log
                 WHERE timestamp >= ?1
                 ORDER BY id DESC
                 LIMIT ?2",
                vec![
                    Box::new(ts.to_rfc3339()) as Box<dyn rusqlite::types::ToSql>,
                    Box::new(limit_i64),
                ],
            ),
            None => (
                "SELECT id, timestamp, operation, subject, details
                 FROM audit_log
                 ORDER BY id DESC
                 LIMIT ?1",
                vec![Box::new(limit_i64) as Box<dyn rusqlite::types::ToSql>],
            ),
        };

        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(sql)?;
                let params_refs: Vec<&dyn rusqlite::types::ToSql> =
                    params.iter().map(|p| &**p).collect();

                let rows = stmt.query_map(params_refs.as_slice(), |row| {
                    let ts_str: String = row.get(1)?;
                    let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                        .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

                    Ok(AuditEntry {
                        id: row.get(0)?,
                        timestamp,
                        operation: row.get(2)?,
                        subject: row.get(3)?,
                        details: row.get(4)?,
                    })
                })?;
                rows.collect()
            })
            .map_err(|e| VaultError::AuditError(format!("query: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audit() -> AuditLog {
        AuditLog::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn log_and_query_newest_first() {
        let audit = audit();

        audit.log("token_issue", Some("cli-1"), None);
        audit.log("var_set", Some("Acme/API_KEY"), Some("default"));
        audit.log("token_revoke", Some("cli-1"), None);

        let entries = audit.query(10, None).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].operation, "token_revoke");
        assert_eq!(entries[1].operation, "var_set");
        assert_eq!(entries[1].details.as_deref(), Some("default"));
        assert_eq!(entries[2].subject.as_deref(), Some("cli-1"));
    }

    #[test]
    fn query_with_limit() {
        let audit = audit();
        for i in 0..10 {
            audit.log("var_set", Some(&format!("KEY_{i}")), None);
        }
        assert_eq!(audit.query(3, None).unwrap().len(), 3);
    }

    #[test]
    fn query_with_since_filter() {
        let audit = audit();
        audit.log("init", None, Some("vault created"));

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(audit.query(10, Some(past)).unwrap().len(), 1);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(audit.query(10, Some(future)).unwrap().is_empty());
    }

    #[test]
    fn optional_fields_stay_empty() {
        let audit = audit();
        audit.log("init", None, None);

        let entries = audit.query(1, None).unwrap();
        assert!(entries[0].subject.is_none());
        assert!(entries[0].details.is_none());
    }
}
