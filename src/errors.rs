use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur in the GeoSync vault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Decryption failed — wrong key or tampered data")]
    AuthenticationFailed,

    #[error("Invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Credential errors ---
    #[error("Master password is already configured")]
    AlreadyConfigured,

    #[error("Vault is not configured — run `geosync init` first")]
    NotConfigured,

    #[error("Invalid master password")]
    InvalidCredential,

    // --- Access token errors ---
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Access token '{0}' not found")]
    TokenNotFound(String),

    // --- Lookup errors ---
    #[error("Project \"{0}\" not found")]
    ProjectNotFound(String),

    #[error("Environment \"{0}\" not found")]
    EnvironmentNotFound(String),

    #[error("Variable \"{0}\" not found")]
    VariableNotFound(String),

    /// Client-side lookup against what the vault host serves.
    #[error("Project \"{name}\" not found. Available projects: {available}")]
    UnknownProject { name: String, available: String },

    #[error("Environment \"{slug}\" not found in project \"{project}\". Available environments: {available}")]
    UnknownEnvironment {
        slug: String,
        project: String,
        available: String,
    },

    // --- Storage errors ---
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database at {path} is damaged and could not be repaired: {reason}")]
    RepairFailed { path: PathBuf, reason: String },

    // --- RPC errors ---
    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Remote(String),

    #[error("Invalid request: {0}")]
    Protocol(String),

    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    // --- Keyring errors ---
    #[error("Keyring error: {0}")]
    KeyringError(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // --- CLI errors ---
    #[error("{0}")]
    Validation(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("Child process exited with code {0}")]
    ChildProcessFailed(i32),

    #[error("No command provided after -- (usage: geosync run --project <name> --env <slug> -- <command>)")]
    NoCommandSpecified,

    #[error("Audit error: {0}")]
    AuditError(String),
}

impl VaultError {
    /// True for both malformed input and a failed tag check.
    ///
    /// Batch resolution and the UI treat the two the same way.
    pub fn is_decryption_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedCiphertext(_) | Self::AuthenticationFailed | Self::InvalidKeyLength(_)
        )
    }

    /// True for a denied credential: bad or expired token, wrong master password.
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidToken | Self::TokenExpired | Self::InvalidCredential | Self::NotConfigured
        )
    }
}

/// Convenience type alias for vault results.
pub type Result<T> = std::result::Result<T, VaultError>;
