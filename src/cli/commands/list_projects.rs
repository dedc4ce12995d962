//! `geosync list-projects` — what the running vault host can serve.

use crate::cli::commands::remote::{self, RemoteSession};
use crate::cli::{client_runtime, output, server_addr, Cli};
use crate::errors::Result;

/// Execute the `list-projects` command.
pub fn execute(cli: &Cli) -> Result<()> {
    let (_, token) = remote::load_token()?;
    let addr = server_addr(cli)?;
    let projects = client_runtime()?.block_on(async {
        let mut session = RemoteSession::open(addr, &token).await?;
        session.projects().await
    })?;

    output::print_projects_table(&projects);
    Ok(())
}
