//! CLI command handlers.

mod auth;
mod info;
mod status;

use anyhow::{Context, Result};
use appengine_remote::{
    AppDescriptor, CookieProtection, CookieStore, Session, SessionOptions, ToolConfig,
    default_cookie_path,
};

use crate::cli::Args;

pub use auth::{run_signin_command, run_signout_command};
pub use info::run_info_command;
pub use status::run_status_command;

/// Cookie store honoring `cookie_file` and `encrypt_cookies` from the tool config.
pub(crate) fn cookie_store(config: &ToolConfig) -> Result<CookieStore> {
    let path = match &config.cookie_file {
        Some(path) => path.clone(),
        None => default_cookie_path().context("Failed to resolve cookie file path")?,
    };
    let protection = CookieProtection::resolve(config.encrypt_cookies.unwrap_or(false))
        .context("Failed to set up cookie encryption")?;
    Ok(CookieStore::new(path, protection))
}

/// Reads app.yaml from `--app-dir` and opens a session for it.
pub(crate) fn open_session(args: &Args, config: &ToolConfig) -> Result<Session> {
    let descriptor = AppDescriptor::load(&args.app_dir).with_context(|| {
        format!(
            "Failed to read application descriptor in '{}'",
            args.app_dir.display()
        )
    })?;
    let options = SessionOptions::from_descriptor(args.local, &descriptor).with_config(config);
    Session::open(options, cookie_store(config)?).context("Failed to set up session")
}
