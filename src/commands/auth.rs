//! Auth command handlers: sign in and sign out.

use anyhow::{Context, Result, anyhow, bail};
use appengine_remote::{Session, SessionOptions, TerminalConsole, ToolConfig, read_credentials};
use tracing::info;

use super::{cookie_store, open_session};
use crate::cli::Args;

pub async fn run_signin_command(args: &Args, config: &ToolConfig) -> Result<()> {
    let session = open_session(args, config)?;
    info!(
        service = %session.service_endpoint(),
        application = %session.application(),
        "Signing in"
    );

    let prompt = tokio::task::spawn_blocking(|| {
        let mut console = TerminalConsole::new();
        read_credentials(&mut console)
    })
    .await
    .context("Credential prompt task failed")?;
    let credentials = match prompt {
        Ok(credentials) => credentials,
        Err(error) if error.is_interrupted() => bail!("Sign-in cancelled"),
        Err(error) => return Err(error).context("Failed to read credentials"),
    };

    let report = session.sign_in(&credentials).await.map_err(|error| {
        anyhow!(
            "Sign-in failed (reached stage: {}): {error}",
            error.stage()
        )
    })?;

    for tray in &report.trays {
        println!("{} = {} cookies", tray.origin, tray.cookies.len());
    }
    println!("cookie_file = {}", report.path.display());
    Ok(())
}

pub fn run_signout_command(args: &Args, config: &ToolConfig) -> Result<()> {
    // Only the cookie file matters here, so app.yaml is not required.
    let options = SessionOptions::new(args.local, "").with_config(config);
    let session =
        Session::open(options, cookie_store(config)?).context("Failed to set up session")?;
    let removed = session
        .sign_out()
        .map_err(|error| anyhow!("Failed to remove saved session: {error}"))?;

    let path = session.cookie_store().path().display();
    if removed {
        info!(path = %path, "Signed out");
    } else {
        info!(path = %path, "No saved session found");
    }
    Ok(())
}
