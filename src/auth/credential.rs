//! The master credential: setup, verification, unlock and password change.
//!
//! ```text
//! Uninitialized ──set_master_password──▶ Configured ──unlock──▶ MasterKey (per session)
//! ```
//!
//! All inputs are the hex SHA-256 verification hash of the password, never
//! the password itself, except for the secret-store helpers which deal in
//! the raw password the OS store keeps.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::biometric::SecretStore;
use crate::crypto::{self, generate_salt, hash_password, verify_hash, MasterKey, Pbkdf2Params};
use crate::errors::{Result, VaultError};
use crate::store::{Database, Profile, SystemCredential};

/// Prompt text shown by platforms that ask for presence before a read.
const UNLOCK_REASON: &str = "Unlock GeoSync";

/// Outcome of `verify_master_password`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    /// Present only when `valid`.
    pub profile: Option<Profile>,
}

impl Verification {
    fn denied() -> Self {
        Self {
            valid: false,
            profile: None,
        }
    }
}

/// What a password change re-encrypted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RekeyReport {
    pub defaults: usize,
    pub overrides: usize,
}

/// Gatekeeper for the singleton system credential.
#[derive(Clone)]
pub struct CredentialGate {
    db: Database,
}

impl CredentialGate {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn is_configured(&self) -> Result<bool> {
        Ok(self.db.with_conn(load_credential)?.is_some())
    }

    /// The stored credential, or `NotConfigured`.
    pub fn credential(&self) -> Result<SystemCredential> {
        self.db
            .with_conn(load_credential)?
            .ok_or(VaultError::NotConfigured)
    }

    /// First-run setup with the default KDF parameters.
    pub fn set_master_password(&self, password_hash: &str) -> Result<()> {
        self.set_master_password_with_params(password_hash, &Pbkdf2Params::default())
    }

    /// First-run setup.  Fails with `AlreadyConfigured` if a credential exists.
    pub fn set_master_password_with_params(
        &self,
        password_hash: &str,
        params: &Pbkdf2Params,
    ) -> Result<()> {
        validate_hash(password_hash)?;
        let salt = generate_salt();

        // Fail on bad parameters before anything is written.
        let probe = SystemCredential {
            password_hash: password_hash.to_string(),
            key_salt: Some(salt.clone()),
            kdf_iterations: params.iterations,
            name: None,
            email: None,
        };
        MasterKey::for_credential(&probe, password_hash)?;

        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO system (id, password_hash, key_salt, kdf_iterations, updated_at)
                 VALUES ('config', ?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO NOTHING",
                params![password_hash, salt, params.iterations, Utc::now()],
            )
        })?;
        if inserted == 0 {
            return Err(VaultError::AlreadyConfigured);
        }

        tracing::info!(iterations = params.iterations, "Master password configured");
        Ok(())
    }

    /// Compare `password_hash` with the stored hash in constant time.
    ///
    /// A wrong password, or no credential at all, is `valid: false`; only
    /// storage failures are errors.
    pub fn verify_master_password(&self, password_hash: &str) -> Result<Verification> {
        let Some(credential) = self.db.with_conn(load_credential)? else {
            return Ok(Verification::denied());
        };
        if !verify_hash(password_hash, &credential.password_hash) {
            return Ok(Verification::denied());
        }
        Ok(Verification {
            valid: true,
            profile: Some(credential.profile()),
        })
    }

    /// Verify `password_hash` and derive the working key.
    pub fn unlock(&self, password_hash: &str) -> Result<MasterKey> {
        let credential = self.credential()?;
        if !verify_hash(password_hash, &credential.password_hash) {
            return Err(VaultError::InvalidCredential);
        }
        MasterKey::for_credential(&credential, password_hash)
    }

    /// Replace the master password and re-encrypt every stored value.
    ///
    /// Runs in one transaction: if any value fails to decrypt under the old
    /// key, nothing is changed.  The new credential always gets a fresh salt,
    /// so legacy vaults are upgraded to the PBKDF2 key on their first change.
    pub fn change_master_password(&self, old_hash: &str, new_hash: &str) -> Result<RekeyReport> {
        validate_hash(new_hash)?;

        let report = self.db.with_transaction(|tx| {
            let current = load_credential(tx)?.ok_or(VaultError::NotConfigured)?;
            if !verify_hash(old_hash, &current.password_hash) {
                return Err(VaultError::InvalidCredential);
            }

            let next = SystemCredential {
                password_hash: new_hash.to_string(),
                key_salt: Some(generate_salt()),
                kdf_iterations: current.kdf_iterations,
                name: current.name.clone(),
                email: current.email.clone(),
            };
            let old_key = MasterKey::for_credential(&current, old_hash)?;
            let new_key = MasterKey::for_credential(&next, new_hash)?;

            let mut report = RekeyReport::default();

            let defaults: Vec<(String, String, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT id, key, default_value FROM variable_definitions
                     WHERE default_value IS NOT NULL",
                )?;
                let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            for (id, key, ciphertext) in defaults {
                let rekeyed = rekey(&ciphertext, &old_key, &new_key, &key)?;
                tx.execute(
                    "UPDATE variable_definitions SET default_value = ?1, updated_at = ?2
                     WHERE id = ?3",
                    params![rekeyed, Utc::now(), id],
                )?;
                report.defaults += 1;
            }

            let overrides: Vec<(String, String, String)> = {
                let mut stmt = tx.prepare(
                    "SELECT v.id, d.key, v.value FROM variable_values v
                     JOIN variable_definitions d ON d.id = v.definition_id",
                )?;
                let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
                rows.collect::<rusqlite::Result<_>>()?
            };
            for (id, key, ciphertext) in overrides {
                let rekeyed = rekey(&ciphertext, &old_key, &new_key, &key)?;
                tx.execute(
                    "UPDATE variable_values SET value = ?1, updated_at = ?2 WHERE id = ?3",
                    params![rekeyed, Utc::now(), id],
                )?;
                report.overrides += 1;
            }

            tx.execute(
                "UPDATE system SET password_hash = ?1, key_salt = ?2, updated_at = ?3
                 WHERE id = 'config'",
                params![next.password_hash, next.key_salt, Utc::now()],
            )?;
            Ok(report)
        })?;

        tracing::info!(
            defaults = report.defaults,
            overrides = report.overrides,
            "Master password changed, values re-encrypted"
        );
        Ok(report)
    }

    pub fn update_profile(&self, name: Option<&str>, email: Option<&str>) -> Result<()> {
        let updated = self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE system SET name = ?1, email = ?2, updated_at = ?3 WHERE id = 'config'",
                params![name, email, Utc::now()],
            )
        })?;
        if updated == 0 {
            return Err(VaultError::NotConfigured);
        }
        Ok(())
    }

    // --- Secret store shortcut ---

    /// Save the raw password in `store` after checking it is current.
    pub fn remember_password(&self, store: &dyn SecretStore, password: &str) -> Result<()> {
        if !self.verify_master_password(&hash_password(password))?.valid {
            return Err(VaultError::InvalidCredential);
        }
        store.save(password)
    }

    /// Unlock with the password saved in `store`.
    ///
    /// `None` means "fall back to the prompt": the store is unavailable,
    /// the user declined, nothing is saved, or the saved password is stale.
    pub fn unlock_with_secret_store(&self, store: &dyn SecretStore) -> Result<Option<MasterKey>> {
        if !store.is_available() || !store.authenticate(UNLOCK_REASON)? {
            return Ok(None);
        }
        let Some(password) = store.get()? else {
            return Ok(None);
        };

        let password_hash = hash_password(&password);
        if !self.verify_master_password(&password_hash)?.valid {
            tracing::warn!("Saved master password no longer matches, ignoring it");
            return Ok(None);
        }
        self.unlock(&password_hash).map(Some)
    }

    pub fn forget_password(&self, store: &dyn SecretStore) -> Result<()> {
        store.delete()
    }
}

fn load_credential(conn: &Connection) -> rusqlite::Result<Option<SystemCredential>> {
    conn.query_row(
        "SELECT password_hash, key_salt, kdf_iterations, name, email
         FROM system WHERE id = 'config'",
        [],
        |row| {
            Ok(SystemCredential {
                password_hash: row.get(0)?,
                key_salt: row.get(1)?,
                kdf_iterations: row.get(2)?,
                name: row.get(3)?,
                email: row.get(4)?,
            })
        },
    )
    .optional()
}

/// A verification hash is 64 hex characters (SHA-256).
fn validate_hash(password_hash: &str) -> Result<()> {
    if password_hash.len() == 64 && password_hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(VaultError::Validation(
            "password hash must be a hex-encoded SHA-256 digest".into(),
        ))
    }
}

fn rekey(ciphertext: &str, old_key: &MasterKey, new_key: &MasterKey, key: &str) -> Result<String> {
    let plaintext = crypto::decrypt(ciphertext, old_key.as_bytes()).map_err(|e| {
        tracing::error!(key, error = %e, "Cannot re-encrypt value, aborting password change");
        e
    })?;
    let plaintext = zeroize::Zeroizing::new(plaintext);
    crypto::encrypt(&plaintext, new_key.as_bytes())
}
