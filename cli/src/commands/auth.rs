use anyhow::Result;
use colored::*;
use serde_json::json;
use session::{AuthenticatedUser, SessionGrant};
use tally_access::AccessContext;

use crate::Format;

pub struct UserArgs {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
}

/// Save a session for later commands
pub fn login(
    ctx: &AccessContext,
    user: UserArgs,
    token: String,
    refresh_token: Option<String>,
    format: Format,
) -> Result<()> {
    let mut identity = AuthenticatedUser::new(user.user_id, user.username, user.email);
    identity.display_name = user.display_name;

    let mut grant = SessionGrant::new(token, identity);
    if let Some(refresh_token) = refresh_token {
        grant = grant.with_refresh_token(refresh_token);
    }
    ctx.login(grant)?;

    let user = crate::context::require_user(ctx)?;
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&json!({ "authenticated": true, "user": user }))?),
        Format::Text => {
            println!("{} Signed in as {}", "✓".green().bold(), user.display_name().bold());
            println!(
                "  Session saved to {}",
                ctx.config().session_file().display().to_string().dimmed()
            );
        }
    }
    Ok(())
}

/// End the saved session
pub fn logout(ctx: &AccessContext, format: Format) -> Result<()> {
    let was_signed_in = ctx.session().is_authenticated();
    ctx.logout();

    match format {
        Format::Json => println!("{}", json!({ "signed_out": was_signed_in })),
        Format::Text if was_signed_in => println!("{} Signed out", "✓".green().bold()),
        Format::Text => println!("{}", "No active session".yellow()),
    }
    Ok(())
}

/// Show the signed-in user
pub fn whoami(ctx: &AccessContext, format: Format) -> Result<()> {
    let user = ctx.session().current_user();

    match format {
        Format::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "authenticated": user.is_some(), "user": user }))?
        ),
        Format::Text => match user {
            Some(user) => {
                println!("{}", user.display_name().bold());
                println!("  {} {}", "id:".cyan(), user.id);
                println!("  {} {}", "username:".cyan(), user.username);
                println!("  {} {}", "email:".cyan(), user.email);
            }
            None => println!("{}", "Not signed in".yellow()),
        },
    }
    Ok(())
}
