//! Two-stage sign-in.
//!
//! 1. Exchange username and password for an identity token at the identity
//!    provider (remote mode only).
//! 2. Present the token to the `/_ah/login` path of the service endpoint and,
//!    when an application is configured, of the application endpoint. Each
//!    responds with a redirect that sets session cookies; the redirect is not
//!    followed.
//!
//! The issued cookies are then written to the cookie file and installed into
//! the session's live jar.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::{debug, info, instrument};
use url::Url;

use super::{CookieTray, Credentials, SessionJar, StorageError};
use crate::constants::{ACCOUNT_TYPE, AUTH_SERVICE, CLIENT_SOURCE, LOGIN_CONTINUE, LOGIN_PATH};
use crate::session::Session;

/// Key/value pairs from an identity provider response body.
///
/// Values are tokens and are never printed by the Debug impl.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthTokenMap {
    values: HashMap<String, String>,
}

impl AuthTokenMap {
    /// Parses a newline-delimited `key=value` body.
    ///
    /// Lines without `=` are ignored; the value is everything after the first `=`.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let values = body
            .lines()
            .filter_map(|line| line.trim_end_matches('\r').split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { values }
    }

    /// Looks up a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The identity token, present on success.
    #[must_use]
    pub fn auth(&self) -> Option<&str> {
        self.get("Auth")
    }

    /// The failure reason, present when the provider rejected the credentials.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.get("Error")
    }

    /// Number of parsed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when nothing was parsed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for AuthTokenMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.values.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("AuthTokenMap")
            .field("keys", &keys)
            .finish_non_exhaustive()
    }
}

/// Progress of a sign-in attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigninStage {
    /// Nothing has been exchanged yet.
    Unauthenticated,
    /// The identity provider accepted the credentials (or local mode skipped it).
    IdentityTokenObtained,
    /// The login endpoints issued their cookies.
    CookiesIssued,
    /// The cookies are on disk.
    Persisted,
}

impl fmt::Display for SigninStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unauthenticated => "unauthenticated",
            Self::IdentityTokenObtained => "identity-token-obtained",
            Self::CookiesIssued => "cookies-issued",
            Self::Persisted => "persisted",
        })
    }
}

/// Why a sign-in failed.
#[derive(Debug, thiserror::Error)]
pub enum SigninError {
    /// The identity provider rejected the credentials.
    #[error("sign-in rejected by identity provider: {0}")]
    Credential(String),
    /// The identity provider answered without an `Auth` or `Error` entry.
    #[error("identity provider response did not include an Auth token")]
    MissingToken,
    /// A sign-in HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// A network-level failure talking to `url`.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Endpoint without query parameters.
        url: String,
        /// The underlying error, stripped of the request URL.
        #[source]
        source: reqwest::Error,
    },
    /// A login URL could not be formed from an endpoint.
    #[error("invalid login URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    /// The cookies were issued but could not be saved.
    #[error("signed in but failed to save session cookies: {0}")]
    Persistence(#[from] StorageError),
}

impl SigninError {
    /// The reason reported by the identity provider, for credential errors.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Credential(reason) => Some(reason),
            _ => None,
        }
    }

    /// The last stage reached before the failure.
    #[must_use]
    pub fn stage(&self) -> SigninStage {
        match self {
            Self::Credential(_) | Self::MissingToken => SigninStage::Unauthenticated,
            Self::Client(_) | Self::Transport { .. } | Self::InvalidEndpoint(_) => {
                SigninStage::IdentityTokenObtained
            }
            Self::Persistence(_) => SigninStage::CookiesIssued,
        }
    }

    fn transport(url: &Url, source: reqwest::Error) -> Self {
        let mut url = url.clone();
        url.set_query(None);
        Self::Transport {
            url: url.to_string(),
            source: source.without_url(),
        }
    }
}

/// Outcome of a successful sign-in.
#[derive(Debug, Clone)]
pub struct SigninReport {
    /// The trays written to disk, service endpoint first.
    pub trays: Vec<CookieTray>,
    /// Cookie file location.
    pub path: PathBuf,
}

impl SigninReport {
    /// Total number of cookies across all trays.
    #[must_use]
    pub fn cookie_count(&self) -> usize {
        self.trays.iter().map(|tray| tray.cookies.len()).sum()
    }
}

/// Runs the two-stage sign-in for `session` and persists the issued cookies.
///
/// # Errors
///
/// - [`SigninError::Credential`] when the identity provider reports `Error`
/// - [`SigninError::Transport`] when any request fails at the network level
/// - [`SigninError::Persistence`] when the cookie file cannot be written
#[instrument(
    skip_all,
    fields(local = session.is_local(), application = %session.application())
)]
pub async fn sign_in(
    session: &Session,
    credentials: &Credentials,
) -> Result<SigninReport, SigninError> {
    let stage = SigninStage::Unauthenticated;
    debug!(%stage, user = %credentials.username, "starting sign-in");

    let tokens = if session.is_local() {
        AuthTokenMap::default()
    } else {
        let client = session
            .http_client_builder()
            .build()
            .map_err(SigninError::Client)?;
        request_identity_token(&client, session.identity_provider(), credentials).await?
    };
    let token = if session.is_local() {
        ""
    } else {
        tokens.auth().ok_or(SigninError::MissingToken)?
    };
    let stage = SigninStage::IdentityTokenObtained;
    debug!(%stage, "identity step complete");

    // Dedicated jar so a failed attempt leaves the live session untouched.
    let jar = Arc::new(SessionJar::new());
    let login_client = session
        .http_client_builder()
        .redirect(Policy::none())
        .cookie_provider(Arc::clone(&jar))
        .build()
        .map_err(SigninError::Client)?;

    let params = login_params(session.is_local(), &credentials.username, token);
    let mut endpoints = vec![session.service_endpoint()];
    if !session.application().is_empty()
        && let Some(endpoint) = session.application_endpoint()
    {
        endpoints.push(endpoint);
    }
    for endpoint in &endpoints {
        request_login_cookies(&login_client, endpoint, &params).await?;
    }
    let stage = SigninStage::CookiesIssued;
    debug!(%stage, cookies = jar.len(), "login endpoints answered");

    let trays: Vec<CookieTray> = endpoints
        .iter()
        .map(|endpoint| jar.tray_for(endpoint))
        .collect();
    session.cookie_store().save(&trays)?;
    let stage = SigninStage::Persisted;
    debug!(%stage, "cookie file written");

    session.install_trays(&trays);

    let report = SigninReport {
        trays,
        path: session.cookie_store().path().to_path_buf(),
    };
    info!(
        trays = report.trays.len(),
        cookies = report.cookie_count(),
        path = %report.path.display(),
        "Signed in"
    );
    Ok(report)
}

async fn request_identity_token(
    client: &Client,
    provider: &Url,
    credentials: &Credentials,
) -> Result<AuthTokenMap, SigninError> {
    let mut url = provider.clone();
    url.query_pairs_mut()
        .append_pair("Email", &credentials.username)
        .append_pair("Passwd", credentials.password())
        .append_pair("source", CLIENT_SOURCE)
        .append_pair("accountType", ACCOUNT_TYPE)
        .append_pair("service", AUTH_SERVICE);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| SigninError::transport(provider, source))?;
    let status = response.status();
    // Rejections arrive as 403 with an `Error=` body, so the body is read regardless of status.
    let body = response
        .text()
        .await
        .map_err(|source| SigninError::transport(provider, source))?;

    let tokens = AuthTokenMap::parse(&body);
    debug!(status = status.as_u16(), ?tokens, "identity provider answered");

    if let Some(reason) = tokens.error() {
        return Err(SigninError::Credential(reason.to_string()));
    }
    Ok(tokens)
}

async fn request_login_cookies(
    client: &Client,
    endpoint: &Url,
    params: &[(&'static str, String)],
) -> Result<(), SigninError> {
    let mut url = endpoint.join(LOGIN_PATH)?;
    url.query_pairs_mut()
        .extend_pairs(params.iter().map(|(key, value)| (*key, value.as_str())));

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|source| SigninError::transport(&url, source))?;

    debug!(
        endpoint = %endpoint,
        status = response.status().as_u16(),
        redirect = response.status().is_redirection(),
        "login endpoint answered"
    );
    Ok(())
}

fn login_params(local: bool, username: &str, token: &str) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("continue", LOGIN_CONTINUE.to_string()),
        ("auth", token.to_string()),
    ];
    if local {
        params.push(("admin", "True".to_string()));
        params.push(("action", "Login".to_string()));
        params.push(("email", username.to_string()));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_token_map_success_body() {
        let tokens = AuthTokenMap::parse("SID=abc\nLSID=def\nAuth=tok-123\n");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens.auth(), Some("tok-123"));
        assert_eq!(tokens.error(), None);
    }

    #[test]
    fn test_parse_token_map_error_body() {
        let tokens = AuthTokenMap::parse("Error=BadAuthentication\n");
        assert_eq!(tokens.error(), Some("BadAuthentication"));
        assert_eq!(tokens.auth(), None);
    }

    #[test]
    fn test_parse_token_map_skips_lines_without_separator() {
        let tokens = AuthTokenMap::parse("garbage\n\n=nokey\nAuth=x\r\n");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens.auth(), Some("x"));
    }

    #[test]
    fn test_parse_token_map_keeps_equals_in_value() {
        let tokens = AuthTokenMap::parse("Url=https://x/?a=b\n");
        assert_eq!(tokens.get("Url"), Some("https://x/?a=b"));
    }

    #[test]
    fn test_token_map_debug_hides_values() {
        let tokens = AuthTokenMap::parse("Auth=very-secret\n");
        let debug = format!("{tokens:?}");
        assert!(debug.contains("Auth"));
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_login_params_remote() {
        let params = login_params(false, "user", "tok");
        assert_eq!(
            params,
            vec![
                ("continue", "http://localhost".to_string()),
                ("auth", "tok".to_string()),
            ]
        );
    }

    #[test]
    fn test_login_params_local_adds_admin_login() {
        let params = login_params(true, "dev@example.com", "");
        assert!(params.contains(&("auth", String::new())));
        assert!(params.contains(&("admin", "True".to_string())));
        assert!(params.contains(&("action", "Login".to_string())));
        assert!(params.contains(&("email", "dev@example.com".to_string())));
    }

    #[test]
    fn test_error_stage_and_reason() {
        let error = SigninError::Credential("BadAuthentication".to_string());
        assert_eq!(error.reason(), Some("BadAuthentication"));
        assert_eq!(error.stage(), SigninStage::Unauthenticated);

        let error = SigninError::Persistence(StorageError::HomeDirUnavailable);
        assert_eq!(error.reason(), None);
        assert_eq!(error.stage(), SigninStage::CookiesIssued);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(SigninStage::Persisted.to_string(), "persisted");
        assert_eq!(
            SigninStage::IdentityTokenObtained.to_string(),
            "identity-token-obtained"
        );
    }
}
