//! `geosync run` — inject an environment's variables into a child process.

use std::process::Command;

use crate::cli::commands::remote;
use crate::cli::output;
use crate::cli::Cli;
use crate::errors::{Result, VaultError};

/// Execute the `run` command.
pub fn execute(
    cli: &Cli,
    project: &str,
    env: &str,
    command: &[String],
    clean_env: bool,
) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Err(VaultError::NoCommandSpecified);
    };

    let variables = remote::fetch_values(cli, project, env)?;

    if clean_env {
        output::success(&format!(
            "Injected {} variables from {project}/{env} into clean environment",
            variables.len()
        ));
    } else {
        output::success(&format!(
            "Injected {} variables from {project}/{env}",
            variables.len()
        ));
    }

    let mut cmd = Command::new(program);
    cmd.args(args);

    if clean_env {
        // Start with a completely empty environment, only vault variables.
        cmd.env_clear();
    }

    let status = cmd.envs(&variables).status().map_err(|e| {
        VaultError::CommandFailed(format!("failed to start '{program}': {e}"))
    })?;

    // Forward the child's exit code.
    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(VaultError::ChildProcessFailed(code)),
        None => Err(VaultError::CommandFailed(
            "child process terminated by signal".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn empty_command_fails_before_connecting() {
        let cli = Cli::parse_from(["geosync", "--port", "1", "run", "--project", "A", "--env", "b"]);
        let err = execute(&cli, "A", "b", &[], false).unwrap_err();
        assert!(matches!(err, VaultError::NoCommandSpecified));
    }
}
