use anyhow::{Context, Result};
use authz::ProjectId;
use colored::*;
use serde_json::json;
use std::process::ExitCode;
use tally_access::AccessContext;

use crate::context::require_user;
use crate::Format;

/// Exit code when the check is not granted.
pub const DENIED: u8 = 2;

/// Check one or more permissions for the signed-in user
pub async fn execute(
    ctx: &AccessContext,
    names: Vec<String>,
    project: Option<String>,
    all: bool,
    format: Format,
) -> Result<ExitCode> {
    require_user(ctx)?;
    let snapshot = ctx
        .cache()
        .fetch(false)
        .await
        .context("Failed to fetch permissions")?;

    let project = project.as_deref().map(ProjectId::from);
    let granted = if all {
        snapshot.has_all_permissions(&names, project.as_ref())
    } else {
        snapshot.has_any_permission(&names, project.as_ref())
    };

    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "granted": granted,
                "mode": if all { "all" } else { "any" },
                "project": project,
                "permissions": names
                    .iter()
                    .map(|name| json!({ "name": name, "held": snapshot.has_permission(name, project.as_ref()) }))
                    .collect::<Vec<_>>(),
            }))?
        ),
        Format::Text => {
            for name in &names {
                let mark = if snapshot.has_permission(name, project.as_ref()) {
                    "✓".green()
                } else {
                    "✗".red()
                };
                println!("  {} {}", mark, name);
            }
            let scope = match &project {
                Some(project) => format!(" in project {}", project),
                None => String::new(),
            };
            if granted {
                println!("{}{}", "Granted".green().bold(), scope);
            } else {
                println!("{}{}", "Denied".red().bold(), scope);
            }
        }
    }

    Ok(if granted {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(DENIED)
    })
}
