//! The in-memory master key.
//!
//! The working key is derived from the master password hash once per
//! unlock and lives only inside a `MasterKey`, which zeroes its memory when
//! dropped.  It is never written to the database, the CLI config or logs.

use std::fmt;

use zeroize::Zeroize;

use super::kdf::{derive_key_with_params, Pbkdf2Params};
use crate::errors::{Result, VaultError};
use crate::store::SystemCredential;

/// Length of the master key in bytes (256 bits).
const KEY_LEN: usize = 32;

/// A wrapper around a 32-byte key that automatically zeroes its memory
/// when dropped.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct MasterKey {
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    /// Create a new `MasterKey` from raw bytes.
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes (e.g. to pass to the cipher).
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }

    /// Derive the working key for a verified password hash.
    ///
    /// Vaults created by this crate carry a `key_salt`: the key is
    /// PBKDF2-SHA512 over the hex password hash.  Credential rows without a
    /// salt predate that and use the hash bytes directly as the key.
    ///
    /// The caller must already have checked `password_hash` against the
    /// credential; this function only derives.
    pub fn for_credential(credential: &SystemCredential, password_hash: &str) -> Result<Self> {
        match credential.key_salt.as_deref() {
            Some(salt) => {
                let params = Pbkdf2Params {
                    iterations: credential.kdf_iterations,
                };
                let mut bytes = derive_key_with_params(password_hash.as_bytes(), salt, &params)?;
                let key = Self::new(bytes);
                bytes.zeroize();
                Ok(key)
            }
            None => Self::from_hex_hash(password_hash),
        }
    }

    /// Interpret a 64-character hex SHA-256 digest as a raw key.
    fn from_hex_hash(password_hash: &str) -> Result<Self> {
        let mut decoded = hex::decode(password_hash).map_err(|e| {
            VaultError::KeyDerivationFailed(format!("password hash is not valid hex: {e}"))
        })?;
        if decoded.len() != KEY_LEN {
            let len = decoded.len();
            decoded.zeroize();
            return Err(VaultError::InvalidKeyLength(len));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(&decoded);
        decoded.zeroize();
        let key = Self::new(bytes);
        bytes.zeroize();
        Ok(key)
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(<redacted>)")
    }
}
