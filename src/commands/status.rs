//! Status command: show endpoints and the restored session.

use anyhow::Result;
use appengine_remote::LoadedConfig;

use super::open_session;
use crate::cli::Args;

pub fn run_status_command(args: &Args, loaded_config: &LoadedConfig) -> Result<()> {
    let session = open_session(args, &loaded_config.config)?;

    let resolved_path = loaded_config.path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if loaded_config.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!(
        "mode = {}",
        if session.is_local() { "local" } else { "remote" }
    );
    println!("application = {}", session.application());
    if !session.version().is_empty() {
        println!("version = {}", session.version());
    }
    println!("service_endpoint = {}", session.service_endpoint());
    println!(
        "application_endpoint = {}",
        session
            .application_endpoint()
            .map_or("<none>", |url| url.as_str())
    );

    let cookie_path = session.cookie_store().path();
    println!("cookie_file = {}", cookie_path.display());
    println!(
        "cookie_file_state = {}",
        if cookie_path.exists() { "present" } else { "absent" }
    );
    println!("restored_trays = {}", session.restored_trays());
    println!("cookies = {}", session.jar().len());

    Ok(())
}
