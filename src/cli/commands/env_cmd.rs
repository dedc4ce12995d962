//! `geosync env` — create and delete a project's environments.

use crate::cli::output;
use crate::cli::{confirm, Cli, HostContext};
use crate::errors::Result;

/// Execute `geosync env create`.
pub fn execute_create(cli: &Cli, project: &str, name: &str, slug: Option<&str>) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let project = ctx.project(project)?;
    let environment = ctx.db.create_environment(&project.id, name, slug)?;

    let subject = format!("{}/{}", project.name, environment.slug);
    ctx.audit().log("env_create", Some(&subject), None);
    output::success(&format!(
        "Created environment '{}' ({}) in '{}'",
        environment.name, environment.slug, project.name
    ));
    Ok(())
}

/// Execute `geosync env delete`.
pub fn execute_delete(cli: &Cli, project: &str, slug: &str, force: bool) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let project = ctx.project(project)?;
    let environment = ctx.environment(&project, slug)?;

    if !force
        && !confirm(
            &format!(
                "Delete environment '{}' and its overrides from '{}'?",
                environment.slug, project.name
            ),
            false,
        )?
    {
        output::info("Cancelled.");
        return Ok(());
    }

    ctx.db.delete_environment(&environment.id)?;
    let subject = format!("{}/{}", project.name, environment.slug);
    ctx.audit().log("env_delete", Some(&subject), None);
    output::success(&format!("Deleted environment '{}'", environment.slug));
    Ok(())
}
