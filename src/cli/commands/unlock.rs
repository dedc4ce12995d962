//! `geosync unlock` — check the master password and show the profile.

use crate::cli::output;
use crate::cli::{prompt_password, Cli, HostContext};
use crate::crypto::hash_password;
use crate::errors::{Result, VaultError};

/// Execute the `unlock` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let gate = ctx.credentials();
    if !gate.is_configured()? {
        return Err(VaultError::NotConfigured);
    }

    let password = prompt_password()?;
    let verification = gate.verify_master_password(&hash_password(&password))?;
    if !verification.valid {
        return Err(VaultError::InvalidCredential);
    }

    output::success("Master password accepted.");
    if let Some(profile) = verification.profile {
        if let Some(name) = profile.name {
            output::info(&format!("Name:  {name}"));
        }
        if let Some(email) = profile.email {
            output::info(&format!("Email: {email}"));
        }
    }
    Ok(())
}
