//! Info command: verify the saved session against the remote API.

use anyhow::{Result, anyhow};
use appengine_remote::ToolConfig;
use tracing::info;

use super::open_session;
use crate::cli::Args;

pub async fn run_info_command(args: &Args, config: &ToolConfig) -> Result<()> {
    let session = open_session(args, config)?;
    if session.jar().is_empty() {
        info!("No saved session cookies; the remote API may reject the request");
    }

    let context = session.context().await.map_err(|error| {
        anyhow!("Failed to connect to remote API: {error}. Run `aeremote signin` if the session has expired")
    })?;

    println!("app_id = {}", context.app_id());
    println!("remote_api = {}", context.endpoint());
    Ok(())
}
