//! Bearer tokens the CLI uses to talk to the running vault host.
//!
//! A raw token is shown once at issue time; only its SHA-256 is stored.

use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::crypto::hash_password;
use crate::errors::{Result, VaultError};
use crate::store::{AccessToken, Database};

/// Prefix that makes GeoSync tokens easy to spot in configs and scanners.
pub const TOKEN_PREFIX: &str = "gsk_";

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// A freshly issued token.  `raw_token` is never retrievable again.
pub struct IssuedToken {
    pub record: AccessToken,
    pub raw_token: Zeroizing<String>,
}

#[derive(Clone)]
pub struct AccessTokenRegistry {
    db: Database,
}

impl AccessTokenRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Issue a token that expires `expires_in_days` from now, or never.
    ///
    /// Zero or negative days give a token that is already expired.
    pub fn issue(&self, name: &str, expires_in_days: Option<i64>) -> Result<IssuedToken> {
        let expires_at = expires_in_days
            .map(|days| {
                TimeDelta::try_days(days)
                    .and_then(|delta| Utc::now().checked_add_signed(delta))
                    .ok_or_else(|| {
                        VaultError::Validation(format!("token lifetime of {days} days is too long"))
                    })
            })
            .transpose()?;
        self.issue_with_expiry(name, expires_at)
    }

    pub fn issue_with_expiry(
        &self,
        name: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedToken> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::Validation("token name must not be empty".into()));
        }

        let raw_token = generate_raw_token();
        let record = AccessToken {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
            last_used_at: None,
            expires_at,
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO access_tokens (id, name, token_hash, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.id,
                    record.name,
                    hash_password(&raw_token),
                    record.created_at,
                    record.expires_at
                ],
            )
        })?;

        tracing::info!(token_id = %record.id, name = %record.name, "Issued access token");
        Ok(IssuedToken { record, raw_token })
    }

    /// Authenticate a raw bearer token and return its id.
    ///
    /// On success `last_used_at` is bumped; if that write fails the token
    /// is still accepted.
    pub fn verify(&self, raw_token: &str) -> Result<String> {
        let token_hash = hash_password(raw_token);
        let token = self
            .db
            .with_conn(|conn| {
                conn.query_row(
                    &format!("SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE token_hash = ?1"),
                    [&token_hash],
                    token_from_row,
                )
                .optional()
            })?
            .ok_or(VaultError::InvalidToken)?;

        let now = Utc::now();
        if token.is_expired_at(now) {
            return Err(VaultError::TokenExpired);
        }

        if let Err(e) = self.touch(&token.id, now) {
            tracing::warn!(token_id = %token.id, error = %e, "Could not update token last-used time");
        }
        Ok(token.id)
    }

    /// Re-check a token id handed back by the client on later requests.
    pub fn check(&self, token_id: &str) -> Result<AccessToken> {
        let token = self.find(token_id)?.ok_or(VaultError::InvalidToken)?;
        if token.is_expired_at(Utc::now()) {
            return Err(VaultError::TokenExpired);
        }
        Ok(token)
    }

    /// Delete a token; its raw value stops verifying immediately.
    pub fn revoke(&self, token_id: &str) -> Result<()> {
        let deleted = self
            .db
            .with_conn(|conn| conn.execute("DELETE FROM access_tokens WHERE id = ?1", [token_id]))?;
        if deleted == 0 {
            return Err(VaultError::TokenNotFound(token_id.to_string()));
        }
        tracing::info!(token_id, "Revoked access token");
        Ok(())
    }

    /// Token metadata, newest first.
    pub fn list(&self) -> Result<Vec<AccessToken>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TOKEN_COLUMNS} FROM access_tokens ORDER BY created_at DESC, id"
            ))?;
            let rows = stmt.query_map([], token_from_row)?;
            rows.collect()
        })
    }

    pub fn find(&self, token_id: &str) -> Result<Option<AccessToken>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {TOKEN_COLUMNS} FROM access_tokens WHERE id = ?1"),
                [token_id],
                token_from_row,
            )
            .optional()
        })
    }

    fn touch(&self, token_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE access_tokens SET last_used_at = ?1 WHERE id = ?2",
                params![now, token_id],
            )
        })?;
        Ok(())
    }
}

const TOKEN_COLUMNS: &str = "id, name, created_at, last_used_at, expires_at";

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<AccessToken> {
    Ok(AccessToken {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: row.get(2)?,
        last_used_at: row.get(3)?,
        expires_at: row.get(4)?,
    })
}

fn generate_raw_token() -> Zeroizing<String> {
    let mut bytes = Zeroizing::new([0u8; TOKEN_BYTES]);
    rand::rng().fill_bytes(&mut bytes[..]);
    Zeroizing::new(format!("{TOKEN_PREFIX}{}", hex::encode(&bytes[..])))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AccessTokenRegistry {
        AccessTokenRegistry::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn raw_token_format() {
        let issued = registry().issue("cli-1", None).unwrap();
        let raw = issued.raw_token.as_str();
        assert!(raw.starts_with(TOKEN_PREFIX));
        assert_eq!(raw.len(), TOKEN_PREFIX.len() + TOKEN_BYTES * 2);
        assert!(issued.record.expires_at.is_none());
    }

    #[test]
    fn only_the_hash_is_stored() {
        let reg = registry();
        let issued = reg.issue("cli-1", None).unwrap();

        let stored: String = reg
            .db
            .with_conn(|c| {
                c.query_row(
                    "SELECT token_hash FROM access_tokens WHERE id = ?1",
                    [&issued.record.id],
                    |r| r.get(0),
                )
            })
            .unwrap();
        assert_eq!(stored, hash_password(&issued.raw_token));
        assert_ne!(stored, *issued.raw_token);
    }

    #[test]
    fn verify_bumps_last_used() {
        let reg = registry();
        let issued = reg.issue("cli-1", None).unwrap();
        assert!(reg.find(&issued.record.id).unwrap().unwrap().last_used_at.is_none());

        let id = reg.verify(&issued.raw_token).unwrap();
        assert_eq!(id, issued.record.id);
        let first = reg.find(&id).unwrap().unwrap().last_used_at.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        reg.verify(&issued.raw_token).unwrap();
        let second = reg.find(&id).unwrap().unwrap().last_used_at.unwrap();
        assert!(second > first);
    }

    #[test]
    fn unknown_token_is_invalid() {
        assert!(matches!(
            registry().verify("gsk_not-a-real-token"),
            Err(VaultError::InvalidToken)
        ));
    }

    #[test]
    fn revoked_token_is_invalid() {
        let reg = registry();
        let issued = reg.issue("cli-1", None).unwrap();
        reg.revoke(&issued.record.id).unwrap();

        assert!(matches!(
            reg.verify(&issued.raw_token),
            Err(VaultError::InvalidToken)
        ));
        assert!(matches!(
            reg.check(&issued.record.id),
            Err(VaultError::InvalidToken)
        ));
        assert!(matches!(
            reg.revoke(&issued.record.id),
            Err(VaultError::TokenNotFound(_))
        ));
    }

    #[test]
    fn expired_token_is_rejected_everywhere() {
        let reg = registry();
        let issued = reg.issue("old", Some(0)).unwrap();

        assert!(matches!(
            reg.verify(&issued.raw_token),
            Err(VaultError::TokenExpired)
        ));
        assert!(matches!(
            reg.check(&issued.record.id),
            Err(VaultError::TokenExpired)
        ));
    }

    #[test]
    fn future_expiry_is_valid() {
        let reg = registry();
        let issued = reg.issue("ci", Some(30)).unwrap();
        assert!(reg.verify(&issued.raw_token).is_ok());
        assert_eq!(reg.check(&issued.record.id).unwrap().name, "ci");
    }

    #[test]
    fn absurd_lifetime_is_rejected() {
        assert!(matches!(
            registry().issue("forever", Some(i64::MAX)),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            registry().issue("   ", None),
            Err(VaultError::Validation(_))
        ));
    }

    #[test]
    fn list_is_newest_first_and_has_no_secrets() {
        let reg = registry();
        let a = reg.issue_with_expiry("a", None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = reg.issue_with_expiry("b", None).unwrap();

        let listed = reg.list().unwrap();
        let ids: Vec<_> = listed.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![b.record.id.as_str(), a.record.id.as_str()]);

        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains(b.raw_token.as_str()));
        assert!(json.contains("createdAt"));
    }
}
