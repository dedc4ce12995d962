//! `geosync keyring` — save the master password in the OS credential store.
//!
//! Later host commands unlock without a prompt. When the keyring feature
//! is not compiled in, saving returns a helpful error message.

use crate::auth::biometric::default_store;
use crate::cli::output;
use crate::cli::{prompt_password, Cli, HostContext};
use crate::errors::Result;

/// Execute `geosync keyring` — save or delete the password.
pub fn execute(cli: &Cli, delete: bool) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let gate = ctx.credentials();
    let store = default_store();

    if delete {
        gate.forget_password(store.as_ref())?;
        output::success("Password removed from OS keyring.");
        return Ok(());
    }

    // Don't use the keyring here, the user is explicitly setting the password.
    let password = prompt_password()?;
    gate.remember_password(store.as_ref(), &password)?;
    output::success("Password saved to OS keyring. Future unlocks will be automatic.");
    Ok(())
}
