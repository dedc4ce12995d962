//! `geosync token` — issue, list and revoke CLI access tokens.
//!
//! The raw token is printed exactly once, at creation; only its hash is
//! stored.

use console::style;

use crate::auth::AccessTokenRegistry;
use crate::cli::output;
use crate::cli::{Cli, HostContext};
use crate::errors::{Result, VaultError};

/// Execute `geosync token create`.
pub fn execute_create(
    cli: &Cli,
    name: &str,
    expires_in_days: Option<i64>,
    copy: bool,
) -> Result<()> {
    if let Some(days) = expires_in_days {
        if days <= 0 {
            return Err(VaultError::Validation(
                "--expires-in-days must be at least 1".into(),
            ));
        }
    }

    let ctx = HostContext::open(cli)?;
    let registry = AccessTokenRegistry::new(ctx.db.clone());
    let issued = registry.issue(name, expires_in_days)?;

    ctx.audit().log("token_issue", Some(&issued.record.name), None);

    output::success(&format!(
        "Issued token '{}' ({})",
        issued.record.name, issued.record.id
    ));
    println!("\n  {}\n", style(issued.raw_token.as_str()).bold());
    output::warning("This is the only time the token is shown.");

    if copy {
        copy_to_clipboard(&issued.raw_token)?;
        output::info("Token copied to clipboard.");
    }
    output::tip("Run `geosync config set-token <TOKEN>` on the machine that runs the CLI.");
    Ok(())
}

/// Execute `geosync token list`.
pub fn execute_list(cli: &Cli) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let tokens = AccessTokenRegistry::new(ctx.db.clone()).list()?;
    output::print_tokens_table(&tokens);
    Ok(())
}

/// Execute `geosync token revoke`.
pub fn execute_revoke(cli: &Cli, id: &str) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let registry = AccessTokenRegistry::new(ctx.db.clone());
    let token = registry
        .find(id)?
        .ok_or_else(|| VaultError::TokenNotFound(id.to_string()))?;

    registry.revoke(&token.id)?;
    ctx.audit().log("token_revoke", Some(&token.name), None);
    output::success(&format!("Revoked token '{}'", token.name));
    Ok(())
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new()
        .map_err(|e| VaultError::CommandFailed(format!("clipboard unavailable: {e}")))?;
    clipboard
        .set_text(text)
        .map_err(|e| VaultError::CommandFailed(format!("failed to copy to clipboard: {e}")))
}
