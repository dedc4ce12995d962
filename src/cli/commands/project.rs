//! `geosync project` — create, list and delete projects.

use crate::cli::output;
use crate::cli::{confirm, Cli, HostContext};
use crate::errors::Result;

/// Execute `geosync project create`.
pub fn execute_create(cli: &Cli, name: &str, org: Option<&str>) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let organization = org.map(|o| ctx.db.ensure_organization(o)).transpose()?;
    let project = ctx
        .db
        .create_project(name, organization.as_ref().map(|o| o.id.as_str()))?;

    ctx.audit().log("project_create", Some(&project.name), None);
    output::success(&format!("Created project '{}'", project.name));
    output::tip(&format!(
        "Run `geosync env create --project \"{}\" <NAME>` to add an environment.",
        project.name
    ));
    Ok(())
}

/// Execute `geosync project list`.
pub fn execute_list(cli: &Cli) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    output::print_projects_table(&ctx.db.project_summaries()?);
    Ok(())
}

/// Execute `geosync project delete`.
pub fn execute_delete(cli: &Cli, name: &str, force: bool) -> Result<()> {
    let ctx = HostContext::open(cli)?;
    let project = ctx.project(name)?;

    // Unless --force is set, ask for confirmation before deleting.
    if !force
        && !confirm(
            &format!(
                "Delete project '{}' with all its environments and variables?",
                project.name
            ),
            false,
        )?
    {
        output::info("Cancelled.");
        return Ok(());
    }

    ctx.db.delete_project(&project.id)?;
    ctx.audit().log("project_delete", Some(&project.name), None);
    output::success(&format!("Deleted project '{}'", project.name));
    Ok(())
}
