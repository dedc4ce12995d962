//! `geosync audit` — display the audit log.
//!
//! Usage:
//!   geosync audit               # show last 50 entries
//!   geosync audit --last 20     # show last 20
//!   geosync audit --since 7d    # entries from last 7 days

use chrono::{DateTime, TimeDelta, Utc};

use crate::audit::AuditEntry;
use crate::cli::output;
use crate::cli::{Cli, HostContext};
use crate::errors::{Result, VaultError};

/// Execute the `audit` command.
pub fn execute(cli: &Cli, last: usize, since: Option<&str>) -> Result<()> {
    let since_dt = match since {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let ctx = HostContext::open(cli)?;
    let entries = ctx.audit().query(last, since_dt)?;

    if entries.is_empty() {
        output::info("No audit entries found.");
        return Ok(());
    }

    print_audit_table(&entries);

    Ok(())
}

/// Turn "7d", "24h" or "30m" into the instant that long ago.
fn parse_duration(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let invalid =
        || VaultError::Validation(format!("invalid duration '{input}', use 7d, 24h or 30m"));

    let unit = input.chars().last().ok_or_else(invalid)?;
    let count: u32 = input[..input.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| invalid())?;

    let span = match unit {
        'd' => TimeDelta::try_days(count.into()),
        'h' => TimeDelta::try_hours(count.into()),
        'm' => TimeDelta::try_minutes(count.into()),
        _ => return Err(invalid()),
    };
    span.and_then(|span| Utc::now().checked_sub_signed(span)).ok_or_else(invalid)
}

/// Print audit entries in a formatted table.
pub fn print_audit_table(entries: &[AuditEntry]) {
    use comfy_table::{ContentArrangement, Table};
    use console::style;

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Time", "Operation", "Subject", "Details"]);

    for entry in entries {
        let time = entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string();
        let op = colorize_operation(&entry.operation);
        let subject = entry.subject.as_deref().unwrap_or("-");
        let details = entry.details.as_deref().unwrap_or("-");

        table.add_row(vec![time, op, subject.to_string(), details.to_string()]);
    }

    println!(
        "{}",
        style(format!("{} audit entries:", entries.len())).bold()
    );
    println!("{table}");
}

/// Colorize operation names for display.
fn colorize_operation(op: &str) -> String {
    use console::style;

    match op {
        "init" | "project_create" | "env_create" | "token_issue" => style(op).green().to_string(),
        "var_set" => style(op).blue().to_string(),
        "var_unset" | "project_delete" | "env_delete" | "token_revoke" => {
            style(op).red().to_string()
        }
        "passwd" => style(op).yellow().to_string(),
        "rpc_read" => style(op).cyan().to_string(),
        _ => op.to_string(),
    }
}
