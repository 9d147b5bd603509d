use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::process::ExitCode;
use tally_access::logging;

mod commands;
mod context;

use commands::{auth, check, navigate, permissions, routes};

/// Tally CLI - Inspect sessions, permissions and route access for the Tally client
#[derive(Parser)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Text)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a session obtained from the backend
    Login {
        #[arg(long)]
        user_id: String,

        #[arg(long)]
        username: String,

        #[arg(long)]
        email: String,

        /// Access token (bearer)
        #[arg(long, env = "TALLY_ACCESS_TOKEN", hide_env_values = true)]
        token: String,

        #[arg(long)]
        refresh_token: Option<String>,

        #[arg(long)]
        display_name: Option<String>,
    },

    /// End the saved session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Fetch and show the current user's permissions
    Permissions {
        /// Ignore the cached snapshot
        #[arg(long)]
        refresh: bool,
    },

    /// Check permissions; exits with 2 when not granted
    Check {
        /// Permission names
        #[arg(required = true)]
        names: Vec<String>,

        /// Check inside this project
        #[arg(short, long)]
        project: Option<String>,

        /// Require every name instead of any one
        #[arg(long)]
        all: bool,
    },

    /// Run the route gate for a location; exits with 2 when redirected
    Navigate {
        /// Location, e.g. /projects/12/members
        path: String,
    },

    /// List configured routes and their requirements
    Routes,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = context::load_config()?;

    // Logs go to the rolling file and stderr; stdout is reserved for command output
    let log_level = if cli.verbose { "debug" } else { "warn" };
    let _guard = match logging::init_logging(&config.logs_dir(), log_level) {
        Ok(guard) => Some(guard),
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!("File logging unavailable, logging to console only: {}", e);
            None
        }
    };

    let ctx = context::build(config)?;
    let format = cli.format;

    match cli.command {
        Commands::Login {
            user_id,
            username,
            email,
            token,
            refresh_token,
            display_name,
        } => {
            let user = auth::UserArgs {
                user_id,
                username,
                email,
                display_name,
            };
            auth::login(&ctx, user, token, refresh_token, format)?;
        }
        Commands::Logout => auth::logout(&ctx, format)?,
        Commands::Whoami => auth::whoami(&ctx, format)?,
        Commands::Permissions { refresh } => permissions::execute(&ctx, refresh, format).await?,
        Commands::Check {
            names,
            project,
            all,
        } => return check::execute(&ctx, names, project, all, format).await,
        Commands::Navigate { path } => return navigate::execute(&ctx, &path, format).await,
        Commands::Routes => routes::execute(&ctx, format)?,
    }

    Ok(ExitCode::SUCCESS)
}
