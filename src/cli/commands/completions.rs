//! `geosync completions` — generate shell completion scripts.
//!
//! Usage:
//!   geosync completions bash > ~/.bash_completion.d/geosync
//!   geosync completions zsh

use std::io::{self, Write};

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use crate::cli::Cli;
use crate::errors::Result;

/// Execute the `completions` command.
pub fn execute(shell: Shell) -> Result<()> {
    write_completions(shell, &mut io::stdout());
    Ok(())
}

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "geosync", out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_script_mentions_subcommands() {
        let mut buf = Vec::new();
        write_completions(Shell::Bash, &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("geosync"));
        assert!(script.contains("list-projects"));
    }

    #[test]
    fn shell_names_parse_case_insensitively() {
        use clap::ValueEnum;
        assert_eq!(Shell::from_str("zsh", true).unwrap(), Shell::Zsh);
        assert_eq!(Shell::from_str("PowerShell", true).unwrap(), Shell::PowerShell);
        assert!(Shell::from_str("csh", true).is_err());
    }
}
