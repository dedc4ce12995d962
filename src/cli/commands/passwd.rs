//! `geosync passwd` — change the master password.
//!
//! Every stored default and override is decrypted with the old key and
//! re-encrypted with the new one in a single transaction; if any value
//! cannot be decrypted nothing changes.

use crate::auth::biometric::default_store;
use crate::cli::output;
use crate::cli::{prompt_new_password, prompt_password, Cli, HostContext};
use crate::crypto::hash_password;
use crate::errors::{Result, VaultError};

/// Execute the `passwd` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let gate = ctx.credentials();

    // 1. Check the current password before asking for a new one.
    output::info("Enter your current master password.");
    let old_password = prompt_password()?;
    let old_hash = hash_password(&old_password);
    if !gate.verify_master_password(&old_hash)?.valid {
        return Err(VaultError::InvalidCredential);
    }

    // 2. Prompt for the new password.
    output::info("Choose your new master password.");
    let new_password = prompt_new_password()?;
    let new_hash = hash_password(&new_password);
    if new_hash == old_hash {
        return Err(VaultError::Validation(
            "the new password must differ from the current one".into(),
        ));
    }

    // 3. Re-encrypt everything under the new key.
    let report = gate.change_master_password(&old_hash, &new_hash)?;

    // 4. A password saved in the keyring is now stale.
    if let Err(e) = gate.forget_password(default_store().as_ref()) {
        tracing::debug!(error = %e, "Could not clear keyring entry");
    }

    ctx.audit().log(
        "passwd",
        None,
        Some(&format!(
            "{} defaults, {} overrides re-encrypted",
            report.defaults, report.overrides
        )),
    );
    output::success(&format!(
        "Master password changed ({} defaults, {} overrides re-encrypted)",
        report.defaults, report.overrides
    ));
    Ok(())
}
