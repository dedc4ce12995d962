//! `geosync init` — first-run setup of the master password.

use crate::cli::output;
use crate::cli::{prompt_new_password, Cli, HostContext};
use crate::crypto::hash_password;
use crate::errors::{Result, VaultError};

/// Execute the `init` command.
pub fn execute(cli: &Cli, name: Option<&str>, email: Option<&str>) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let gate = ctx.credentials();

    // 1. Refuse to overwrite an existing credential.
    if gate.is_configured()? {
        output::tip("Use `geosync passwd` to change the master password.");
        return Err(VaultError::AlreadyConfigured);
    }

    // 2. Prompt for a new password (with confirmation).
    let password = prompt_new_password()?;

    // 3. Store the verification hash and a fresh key salt.
    gate.set_master_password_with_params(&hash_password(&password), &ctx.settings.kdf_params())?;
    if name.is_some() || email.is_some() {
        gate.update_profile(name, email)?;
    }

    ctx.audit().log("init", None, None);
    output::success(&format!(
        "Vault initialized at {}",
        ctx.db.path().display()
    ));

    // 4. Show helpful tips.
    output::tip("Run `geosync project create <NAME>` to add a project.");
    output::tip("Run `geosync token create <NAME>` to issue a CLI access token.");
    output::tip("Run `geosync serve` to start the vault host.");

    Ok(())
}
