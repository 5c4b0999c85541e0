//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Sign in to an App Engine application and keep the session.
///
/// Session cookies are saved to `~/.cookies` so later commands run without
/// asking for credentials again.
#[derive(Parser, Debug)]
#[command(name = "aeremote")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use the local development servers (localhost:8000 / localhost:8080)
    #[arg(long, global = true)]
    pub local: bool,

    /// Directory containing app.yaml
    #[arg(long, value_name = "DIR", default_value = ".", global = true)]
    pub app_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Prompt for credentials, sign in and save the session cookies
    Signin,
    /// Delete the saved session cookies
    Signout,
    /// Show endpoints and the saved session
    Status,
    /// Connect to the remote API and print the application id
    Info,
}
