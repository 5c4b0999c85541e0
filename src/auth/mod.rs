//! Authentication and session cookie management.
//!
//! This module reads credentials from the terminal, runs the two-stage
//! sign-in, and keeps the issued cookies both in a live jar and in the
//! cookie file.

mod cookies;
mod credentials;
mod signin;
mod storage;

pub use cookies::{CookieTray, SessionJar, StoredCookie, endpoint_origin, parse_set_cookie};
pub use credentials::{
    Console, CredentialReadError, Credentials, TerminalConsole, read_credentials,
};
pub use signin::{AuthTokenMap, SigninError, SigninReport, SigninStage, sign_in};
pub use storage::{
    COOKIE_KEY_ENV, CookieProtection, CookieStore, StorageError, default_cookie_path,
};
