//! Authentication: who may read the vault.
//!
//! This module provides:
//! - The master credential and the per-session unlock (`credential`)
//! - The OS secret-store shortcut for the master password (`biometric`)
//! - Bearer tokens for the CLI (`tokens`)

pub mod biometric;
pub mod credential;
pub mod tokens;

pub use biometric::{MemorySecretStore, SecretStore};
pub use credential::{CredentialGate, RekeyReport, Verification};
pub use tokens::{AccessTokenRegistry, IssuedToken};
