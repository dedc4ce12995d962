//! Colored terminal output helpers.
//!
//! All user-facing output goes through these functions so we get
//! consistent styling across every command.

use std::collections::BTreeMap;

use chrono::Utc;
use comfy_table::{ContentArrangement, Table};
use console::style;

use crate::resolver::{ResolvedValue, ResolvedVariable};
use crate::store::{AccessToken, ProjectSummary};

/// Shown in place of secret values unless `--reveal` is given.
const MASK: &str = "••••••••";

/// Print a green success message: "check_mark {msg}"
pub fn success(msg: &str) {
    println!("{} {}", style("\u{2713}").green().bold(), msg);
}

/// Print a red error message: "x_mark {msg}"
pub fn error(msg: &str) {
    eprintln!("{} {}", style("\u{2717}").red().bold(), msg);
}

/// Print a yellow warning: "warning_sign {msg}"
pub fn warning(msg: &str) {
    eprintln!("{} {}", style("\u{26a0}").yellow().bold(), msg);
}

/// Print a blue info message: "info_sign {msg}"
pub fn info(msg: &str) {
    println!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Like [`info`], but on stderr for commands whose stdout is data.
pub fn notice(msg: &str) {
    eprintln!("{} {}", style("\u{2139}").blue().bold(), msg);
}

/// Print a dim tip/hint: "arrow {msg}"
pub fn tip(msg: &str) {
    println!("{} {}", style("\u{2192}").dim(), style(msg).dim());
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

/// Print projects with their organization and environment slugs.
pub fn print_projects_table(projects: &[ProjectSummary]) {
    if projects.is_empty() {
        info("No projects yet.");
        tip("Run `geosync project create <NAME>` to add one.");
        return;
    }

    let mut table = new_table(vec!["Project", "Organization", "Environments"]);
    for p in projects {
        let envs = p
            .environments
            .iter()
            .map(|e| e.slug.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        table.add_row(vec![
            p.name.clone(),
            p.organization.clone().unwrap_or_else(|| "-".into()),
            if envs.is_empty() { "-".into() } else { envs },
        ]);
    }
    println!("{table}");
}

/// Print access tokens (never the raw token, which is not stored).
pub fn print_tokens_table(tokens: &[AccessToken]) {
    if tokens.is_empty() {
        info("No access tokens.");
        tip("Run `geosync token create <NAME>` to issue one.");
        return;
    }

    let now = Utc::now();
    let mut table = new_table(vec!["ID", "Name", "Created", "Last used", "Expires"]);
    for t in tokens {
        let expires = match t.expires_at {
            Some(_) if t.is_expired_at(now) => style("expired").red().to_string(),
            Some(at) => at.format("%Y-%m-%d").to_string(),
            None => "never".into(),
        };
        table.add_row(vec![
            t.id.clone(),
            t.name.clone(),
            t.created_at.format("%Y-%m-%d %H:%M").to_string(),
            t.last_used_at
                .map_or_else(|| "-".into(), |at| at.format("%Y-%m-%d %H:%M").to_string()),
            expires,
        ]);
    }
    println!("{table}");
}

/// Print resolved variables; secret values are masked unless `reveal`.
pub fn print_variables_table(variables: &BTreeMap<String, ResolvedVariable>, reveal: bool) {
    if variables.is_empty() {
        info("No variables in this project yet.");
        tip("Run `geosync var set --project <NAME> <KEY> <VALUE>` to add one.");
        return;
    }

    let mut table = new_table(vec!["Key", "Value", "Source"]);
    for (key, var) in variables {
        let value = match &var.value {
            ResolvedValue::Plain(_) if var.is_secret && !reveal => MASK.to_string(),
            ResolvedValue::Plain(v) => v.clone(),
            ResolvedValue::Missing => style("(unset)").dim().to_string(),
            ResolvedValue::DecryptionFailed => style(var.value.to_string()).red().to_string(),
        };
        let source = if var.is_overridden {
            "override"
        } else {
            "default"
        };
        table.add_row(vec![key.clone(), value, source.to_string()]);
    }
    println!("{table}");
}
