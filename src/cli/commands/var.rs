//! `geosync var` — project defaults and per-environment overrides.
//!
//! Without `--env` a command works on the project-wide default; with
//! `--env <slug>` it works on that environment's override.

use zeroize::Zeroizing;

use crate::cli::output;
use crate::cli::{Cli, HostContext};
use crate::errors::{Result, VaultError};
use crate::resolver::VariableResolver;

/// Arguments of `geosync var set`.
pub struct SetArgs<'a> {
    pub project: &'a str,
    pub key: &'a str,
    pub value: Option<&'a str>,
    pub env: Option<&'a str>,
    pub secret: bool,
    pub description: Option<&'a str>,
}

/// Execute `geosync var set`.
pub fn execute_set(cli: &Cli, args: &SetArgs<'_>) -> Result<()> {
    validate_key(args.key)?;

    let ctx = HostContext::open(cli)?;
    let project = ctx.project(args.project)?;
    let environment = args
        .env
        .map(|slug| ctx.environment(&project, slug))
        .transpose()?;

    let master_key = ctx.unlock()?;
    let existing = ctx
        .db
        .list_definitions(&project.id)?
        .into_iter()
        .find(|d| d.key == args.key);

    // Flags only ever add to what the definition already says.
    let is_secret = args.secret || existing.as_ref().is_some_and(|d| d.is_secret);
    let description = args
        .description
        .map(str::to_string)
        .or_else(|| existing.as_ref().and_then(|d| d.description.clone()));

    let value = match args.value {
        Some(v) => Zeroizing::new(v.to_string()),
        None => prompt_value(args.key, is_secret)?,
    };

    let resolver = VariableResolver::new(ctx.db.clone());
    let subject = format!("{}/{}", project.name, args.key);

    match environment {
        None => {
            resolver.store_default(
                &project.id,
                args.key,
                description.as_deref(),
                Some(value.as_str()),
                is_secret,
                &master_key,
            )?;
            ctx.audit().log("var_set", Some(&subject), Some("default"));
            output::success(&format!("Set default for '{}'", args.key));
        }
        Some(environment) => {
            let definition = match existing {
                Some(d) if d.is_secret == is_secret && d.description == description => d,
                // Keep the current default, only the flags change.
                Some(d) => ctx.db.upsert_definition(
                    &project.id,
                    args.key,
                    description.as_deref(),
                    d.default_value.as_deref(),
                    is_secret,
                )?,
                None => resolver.store_default(
                    &project.id,
                    args.key,
                    description.as_deref(),
                    None,
                    is_secret,
                    &master_key,
                )?,
            };
            resolver.store_override(&environment.id, &definition.id, &value, &master_key)?;

            let details = format!("override:{}", environment.slug);
            ctx.audit().log("var_set", Some(&subject), Some(&details));
            output::success(&format!(
                "Set '{}' for environment '{}'",
                args.key, environment.slug
            ));
        }
    }
    Ok(())
}

/// Execute `geosync var unset`.
pub fn execute_unset(cli: &Cli, project: &str, key: &str, env: Option<&str>) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let project = ctx.project(project)?;
    let subject = format!("{}/{key}", project.name);

    match env {
        None => {
            ctx.db.delete_definition(&project.id, key)?;
            ctx.audit().log("var_unset", Some(&subject), Some("definition"));
            output::success(&format!("Removed '{key}' from '{}'", project.name));
        }
        Some(slug) => {
            let environment = ctx.environment(&project, slug)?;
            let definition = ctx.db.find_definition(&project.id, key)?;
            if !ctx.db.delete_value(&environment.id, &definition.id)? {
                return Err(VaultError::Validation(format!(
                    "'{key}' has no override in environment '{}'",
                    environment.slug
                )));
            }
            let details = format!("override:{}", environment.slug);
            ctx.audit().log("var_unset", Some(&subject), Some(&details));
            output::success(&format!(
                "Removed the '{}' override of '{key}'; the default applies again",
                environment.slug
            ));
        }
    }
    Ok(())
}

/// Execute `geosync var show`.
pub fn execute_show(cli: &Cli, project: &str, env: &str, reveal: bool) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let project = ctx.project(project)?;
    let environment = ctx.environment(&project, env)?;
    let master_key = ctx.unlock()?;

    let variables = VariableResolver::new(ctx.db.clone()).resolve_all(
        &project.id,
        &environment.id,
        None,
        &master_key,
    )?;
    output::print_variables_table(&variables, reveal);
    Ok(())
}

/// Variable names must be usable as environment variable names.
fn validate_key(key: &str) -> Result<()> {
    let mut chars = key.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(VaultError::Validation(format!(
            "variable name '{key}' is invalid: use letters, digits and underscores, not starting with a digit"
        )));
    }
    Ok(())
}

fn prompt_value(key: &str, secret: bool) -> Result<Zeroizing<String>> {
    let value = if secret {
        dialoguer::Password::new()
            .with_prompt(format!("Value for {key}"))
            .allow_empty_password(true)
            .interact()
    } else {
        dialoguer::Input::<String>::new()
            .with_prompt(format!("Value for {key}"))
            .allow_empty(true)
            .interact_text()
    };
    value
        .map(Zeroizing::new)
        .map_err(|e| VaultError::CommandFailed(format!("value prompt: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_env_style_names() {
        assert!(validate_key("DATABASE_URL").is_ok());
        assert!(validate_key("_PRIVATE").is_ok());
        assert!(validate_key("api_key2").is_ok());
    }

    #[test]
    fn rejects_names_a_shell_cannot_export() {
        assert!(validate_key("").is_err());
        assert!(validate_key("2FA").is_err());
        assert!(validate_key("API-KEY").is_err());
        assert!(validate_key("A=B").is_err());
        assert!(validate_key("HAS SPACE").is_err());
    }
}
