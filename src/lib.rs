//! App Engine remote session library.
//!
//! Signs a user in to an App Engine style service, keeps the issued session
//! cookies on disk, and rebuilds an authenticated HTTP context from them on
//! later runs.
//!
//! # Architecture
//!
//! - [`auth`] - Credential prompt, cookie jar, cookie file, two-stage sign-in
//! - [`session`] - Endpoint resolution and cookie restore
//! - [`remote`] - Remote API context construction
//! - [`config`] - Tool configuration file and application descriptor

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod constants;
pub mod remote;
pub mod session;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use auth::{
    AuthTokenMap, Console, CookieProtection, CookieStore, CookieTray, CredentialReadError,
    Credentials, SessionJar, SigninError, SigninReport, SigninStage, StorageError, StoredCookie,
    TerminalConsole, default_cookie_path, read_credentials, sign_in,
};
pub use config::{AppDescriptor, ConfigError, LoadedConfig, ToolConfig};
pub use remote::{ContextError, RemoteContext, build_context};
pub use session::{Session, SessionError, SessionOptions};
