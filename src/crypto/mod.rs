//! Cryptographic primitives for the vault.
//!
//! This module provides:
//! - AES-256-GCM envelope encryption of single values (`cipher`)
//! - Password hashing and PBKDF2 key derivation (`kdf`)
//! - The zeroizing in-memory `MasterKey` (`keys`)

pub mod cipher;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{encrypt, decrypt, hash_password, MasterKey, ...};
pub use cipher::{decrypt, encrypt};
pub use kdf::{
    derive_key, derive_key_with_params, generate_salt, hash_password, verify_hash, Pbkdf2Params,
};
pub use keys::MasterKey;
