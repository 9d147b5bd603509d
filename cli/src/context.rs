use anyhow::{bail, Context, Result};
use session::AuthenticatedUser;
use tally_access::{AccessConfig, AccessContext};

/// Reads `config.access.yaml`, `.env` and `TALLY_*` variables.
pub fn load_config() -> Result<AccessConfig> {
    AccessConfig::load().context("Failed to load configuration")
}

pub fn build(config: AccessConfig) -> Result<AccessContext> {
    AccessContext::new(config).context("Failed to initialize access layer")
}

/// The signed-in user, or an error telling the operator to log in.
pub fn require_user(ctx: &AccessContext) -> Result<AuthenticatedUser> {
    match ctx.session().current_user() {
        Some(user) => Ok(user),
        None => bail!("Not signed in. Run `tally login` first."),
    }
}
