//! CLI-side configuration, `~/.geosync/config.json`.
//!
//! Holds the bearer token and, if the user opted in, the master password
//! hash, so neither has to be typed on every run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, VaultError};

/// Environment variable that overrides the configured token.
pub const TOKEN_ENV: &str = "GEOSYNC_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key_hash: Option<String>,
}

impl ClientConfig {
    /// `~/.geosync/config.json`.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| VaultError::ConfigError("cannot locate the home directory".into()))?;
        Ok(home.join(".geosync").join("config.json"))
    }

    /// Load the config at `path`.  A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", path.display()))
        })
    }

    /// Write the config with owner-only permissions.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VaultError::SerializationError(e.to_string()))?;
        std::fs::write(path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }
        Ok(())
    }

    /// The token to use: `env_token` (from `GEOSYNC_TOKEN`) wins over the file.
    pub fn resolve_token(&self, env_token: Option<&str>) -> Result<String> {
        env_token
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| self.token.clone().filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                VaultError::Validation(format!(
                    "No access token found. Set {TOKEN_ENV} or run `geosync config set-token <token>`"
                ))
            })
    }
}
