use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::Pbkdf2Params;
use crate::errors::{Result, VaultError};

/// Vault host configuration, loaded from `<data_dir>/geosync.toml`.
///
/// Every field has a sensible default so the host works out-of-the-box
/// without any config file at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Address the RPC server binds to.  Must be a loopback address.
    #[serde(default = "default_host")]
    pub host: String,

    /// RPC server port (default: 8765).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database file, relative to the data directory unless absolute.
    #[serde(default = "default_database")]
    pub database: String,

    /// PBKDF2 iterations for newly created vaults (default: 100 000).
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,

    /// Seconds an RPC connection may sit idle (default: 60).
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_database() -> String {
    "geosync.db".to_string()
}

fn default_kdf_iterations() -> u32 {
    crate::crypto::kdf::DEFAULT_ITERATIONS
}

fn default_idle_timeout_secs() -> u64 {
    60
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: default_database(),
            kdf_iterations: default_kdf_iterations(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the data directory.
    pub const FILE_NAME: &'static str = "geosync.toml";

    /// Load settings from `<data_dir>/geosync.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        Ok(settings)
    }

    /// Full path of the vault database.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.database)
    }

    /// The loopback address to serve on.
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.host.parse().map_err(|_| {
            VaultError::ConfigError(format!("host '{}' is not an IP address", self.host))
        })?;
        if !ip.is_loopback() {
            return Err(VaultError::ConfigError(format!(
                "host '{ip}' is not a loopback address; the RPC server only listens locally"
            )));
        }
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Convert the KDF settings into crypto-layer params.
    pub fn kdf_params(&self) -> Pbkdf2Params {
        Pbkdf2Params {
            iterations: self.kdf_iterations,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Where the vault host keeps its database and `geosync.toml` when no
/// `--data-dir` is given: the platform data directory, e.g.
/// `~/.local/share/geosync` on Linux.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("geosync"))
        .unwrap_or_else(|| PathBuf::from(".geosync"))
}

// ── Tests ────────────────────────────────────────────────────────────
