use anyhow::Result;
use colored::*;
use route_gate::{RequiredPermissions, RouteDef};
use tally_access::AccessContext;

use crate::Format;

/// List configured routes
pub fn execute(ctx: &AccessContext, format: Format) -> Result<()> {
    let routes: Vec<&RouteDef> = ctx.routes().routes().collect();

    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&routes)?),
        Format::Text => {
            println!("{}", "═══════════════════════════════════════".blue());
            println!("{}", "Tally Routes".bold());
            println!("{}", "═══════════════════════════════════════".blue());
            for route in &routes {
                let auth = if route.meta.requires_auth {
                    "auth".yellow()
                } else {
                    "public".green()
                };
                println!("{:<20} {:<30} {}", route.name.bold(), route.path, auth);
                if let Some(required) = &route.meta.required_permissions {
                    println!("  {} {}", "requires".cyan(), describe(required));
                }
            }
            println!();
            println!("{} {}", "Total routes:".cyan(), routes.len());
        }
    }
    Ok(())
}

fn describe(required: &RequiredPermissions) -> String {
    match required {
        RequiredPermissions::Flat(names) => format!("any of [{}]", names.join(", ")),
        RequiredPermissions::AnyOfScoped {
            any_of,
            project_param,
        } => format!("any of [{}] in project :{}", any_of.join(", "), project_param),
    }
}
