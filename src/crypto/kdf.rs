//! Password hashing and PBKDF2 key derivation.
//!
//! Two separate values come out of the master password:
//! - a **verification hash** (`hash_password`, hex SHA-256) stored in the
//!   credential row and sent by the CLI as `masterKeyHash`;
//! - a **working key** (`derive_key`, PBKDF2-HMAC-SHA512) that actually
//!   encrypts values.  It is never stored.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};
use subtle::ConstantTimeEq;

use crate::errors::{Result, VaultError};

/// Length of the salt in bytes (512 bits).
const SALT_LEN: usize = 64;

/// Length of the derived key in bytes (256 bits, for AES-256).
const KEY_LEN: usize = 32;

/// Default PBKDF2 iteration count.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Minimum accepted iteration count.
const MIN_ITERATIONS: u32 = 1_000;

/// Configurable PBKDF2 parameters.
///
/// The iteration count used when the vault was set up is stored next to
/// the salt, so later unlocks always use the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pbkdf2Params {
    pub iterations: u32,
}

impl Default for Pbkdf2Params {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Derive a 32-byte key from a password and a hex-encoded salt.
///
/// Uses the default parameters (PBKDF2-HMAC-SHA512, 100 000 iterations).
pub fn derive_key(password: &[u8], salt_hex: &str) -> Result<[u8; KEY_LEN]> {
    derive_key_with_params(password, salt_hex, &Pbkdf2Params::default())
}

/// Derive a 32-byte key with explicit parameters.
///
/// The same password + salt + params always produce the same key.
pub fn derive_key_with_params(
    password: &[u8],
    salt_hex: &str,
    params: &Pbkdf2Params,
) -> Result<[u8; KEY_LEN]> {
    if params.iterations < MIN_ITERATIONS {
        return Err(VaultError::KeyDerivationFailed(format!(
            "PBKDF2 iterations must be at least {MIN_ITERATIONS} (got {})",
            params.iterations
        )));
    }

    let salt = hex::decode(salt_hex)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("salt is not valid hex: {e}")))?;
    if salt.is_empty() {
        return Err(VaultError::KeyDerivationFailed("salt must not be empty".into()));
    }

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha512>(password, &salt, params.iterations, &mut key);
    Ok(key)
}

/// Generate a cryptographically random 64-byte salt, hex-encoded.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    hex::encode(salt)
}

/// Hex SHA-256 of the UTF-8 password, the stored verification hash.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Compare a presented hash with the stored one in constant time.
pub fn verify_hash(candidate: &str, stored: &str) -> bool {
    candidate.as_bytes().ct_eq(stored.as_bytes()).into()
}
