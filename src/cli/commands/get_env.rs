//! `geosync get-env` — print an environment's variables as `KEY=VALUE` lines.

use crate::cli::commands::remote;
use crate::cli::Cli;
use crate::errors::Result;

/// Execute the `get-env` command.
pub fn execute(cli: &Cli, project: &str, env: &str) -> Result<()> {
    let variables = remote::fetch_values(cli, project, env)?;
    for (key, value) in &variables {
        println!("{key}={value}");
    }
    Ok(())
}
