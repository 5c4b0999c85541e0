//! CLI entry point for aeremote.

use anyhow::{Context, Result, bail};
use appengine_remote::config::load_default_tool_config;
use clap::Parser;
use tracing::{debug, warn};

mod cli;
mod commands;
mod terminal;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    let no_color = terminal::no_color_env_requested() || terminal::is_dumb_terminal();
    terminal::init_tracing(terminal::default_level(args.verbose, args.quiet), no_color);
    debug!(?args, "CLI arguments parsed");

    let loaded_config = load_default_tool_config().context("Failed to load config file")?;
    if loaded_config.loaded_from_file {
        debug!(path = ?loaded_config.path, "Loaded config file");
    }

    tokio::select! {
        result = run(&args, &loaded_config) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            warn!("Interrupted");
            bail!("Interrupted")
        }
    }
}

async fn run(args: &Args, loaded_config: &appengine_remote::LoadedConfig) -> Result<()> {
    let config = &loaded_config.config;
    match args.command {
        Command::Signin => commands::run_signin_command(args, config).await,
        Command::Signout => commands::run_signout_command(args, config),
        Command::Status => commands::run_status_command(args, loaded_config),
        Command::Info => commands::run_info_command(args, config).await,
    }
}
