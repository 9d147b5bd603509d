use anyhow::{Context, Result};
use authz::{PermissionSnapshot, RoleTier};
use colored::*;
use serde_json::json;
use tally_access::AccessContext;

use crate::context::require_user;
use crate::Format;

/// Fetch and print the signed-in user's permissions
pub async fn execute(ctx: &AccessContext, refresh: bool, format: Format) -> Result<()> {
    let user = require_user(ctx)?;
    let snapshot = ctx
        .cache()
        .fetch(refresh)
        .await
        .context("Failed to fetch permissions")?;
    let tier = RoleTier::classify(&snapshot);

    match format {
        Format::Json => {
            let output = json!({
                "user": user.id,
                "tier": tier,
                "permissions": &*snapshot,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Format::Text => print_text(user.display_name(), tier, &snapshot),
    }
    Ok(())
}

fn print_text(user: &str, tier: RoleTier, snapshot: &PermissionSnapshot) {
    println!("{}", "═══════════════════════════════════════".blue());
    println!("{} {}", "Permissions for".bold(), user.bold());
    println!("{}", "═══════════════════════════════════════".blue());

    println!("{} {}", "Tier:".cyan(), tier.to_string().bold());
    if let Some(fetched_at) = snapshot.fetched_at() {
        println!(
            "{} {}",
            "Fetched:".cyan(),
            fetched_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
    }

    println!();
    println!("{}", "Global roles".bold());
    if snapshot.global_roles().is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for role in snapshot.global_roles() {
        println!("  {} ({} permissions)", role.name.green(), role.permissions.len());
        for permission in &role.permissions {
            println!("    - {}", permission.name);
        }
    }

    println!();
    println!("{}", "Project access".bold());
    if snapshot.project_access().is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for grant in snapshot.project_access() {
        let roles = if grant.roles.is_empty() {
            String::new()
        } else {
            format!(" [{}]", grant.roles.join(", "))
        };
        println!("  {} {}{}", "project".cyan(), grant.project_id.to_string().bold(), roles);
        for name in &grant.permission_names {
            println!("    - {}", name);
        }
    }

    println!();
    println!(
        "{} {}",
        "Distinct permissions:".cyan(),
        snapshot.all_permission_names().len()
    );
}
