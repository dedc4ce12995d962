//! `geosync config` — edit `~/.geosync/config.json`.

use crate::cli::output;
use crate::config::ClientConfig;
use crate::errors::{Result, VaultError};

/// Execute `geosync config set-token <token>`.
pub fn execute_set_token(token: &str) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        return Err(VaultError::Validation("token cannot be empty".into()));
    }

    let path = ClientConfig::default_path()?;
    let mut config = ClientConfig::load(&path)?;
    config.token = Some(token.to_string());
    config.save(&path)?;

    output::success(&format!("Token saved to {}", path.display()));
    Ok(())
}

/// Execute `geosync config forget-password`.
pub fn execute_forget_password() -> Result<()> {
    let path = ClientConfig::default_path()?;
    let mut config = ClientConfig::load(&path)?;
    if config.master_key_hash.take().is_none() {
        output::info("No saved password hash.");
        return Ok(());
    }
    config.save(&path)?;
    output::success("Saved password hash removed.");
    Ok(())
}
