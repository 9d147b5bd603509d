use anyhow::Result;
use colored::*;
use route_gate::{NavigationOutcome, Navigator, RouteDef, RouteMatch};
use serde_json::json;
use std::process::ExitCode;
use std::sync::Arc;
use tally_access::AccessContext;
use tracing::debug;

use super::check::DENIED;
use crate::Format;

/// The CLI has no view to update; outcomes are reported by `execute`.
struct TraceNavigator;

impl Navigator for TraceNavigator {
    fn commit(&self, target: &RouteMatch) {
        debug!(route = %target.route.name, "Committing navigation");
    }

    fn redirect(&self, route: &RouteDef) {
        debug!(route = %route.name, "Redirecting navigation");
    }
}

/// Run the route gate for `path` as the signed-in user (or anonymously)
pub async fn execute(ctx: &AccessContext, path: &str, format: Format) -> Result<ExitCode> {
    let gate = ctx.gate(Arc::new(TraceNavigator))?;
    let outcome = gate.navigate(path).await;

    match format {
        Format::Json => {
            let output = match &outcome {
                NavigationOutcome::Allowed { route } => json!({
                    "outcome": "allowed",
                    "route": route.route.name,
                    "params": route.params,
                }),
                NavigationOutcome::Redirected { to, reason } => json!({
                    "outcome": "redirected",
                    "route": to.name,
                    "path": to.path,
                    "reason": reason,
                }),
                NavigationOutcome::Superseded => json!({ "outcome": "superseded" }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Format::Text => match &outcome {
            NavigationOutcome::Allowed { route } => {
                println!("{} {} ({})", "Allowed:".green().bold(), route.route.name.bold(), route.route.path);
                for (name, value) in &route.params {
                    println!("  {} = {}", name.cyan(), value);
                }
            }
            NavigationOutcome::Redirected { to, reason } => {
                println!(
                    "{} {} ({}): {}",
                    "Redirected to".yellow().bold(),
                    to.name.bold(),
                    to.path,
                    reason
                );
            }
            NavigationOutcome::Superseded => println!("{}", "Superseded".dimmed()),
        },
    }

    Ok(if outcome.is_allowed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(DENIED)
    })
}
