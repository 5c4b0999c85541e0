//! Authenticated remote API context.
//!
//! [`build_context`] turns a host and a cookie-carrying client into a
//! [`RemoteContext`] after a token round-trip against `/_ah/remote_api`
//! confirms the cookies are accepted.

mod handshake;

use std::net::{Ipv4Addr, Ipv6Addr};

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, info, instrument};
use url::{Host, Url};

use crate::constants::REMOTE_API_PATH;

/// Header the remote API handler requires on every request.
pub const API_VERSION_HEADER: &str = "X-Appcfg-Api-Version";

const MAX_BODY_IN_ERROR: usize = 200;

/// Errors while establishing a remote API context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The host does not form a valid endpoint URL.
    #[error("invalid remote API host '{host}'")]
    InvalidHost {
        /// Host as given.
        host: String,
    },
    /// The session has no application endpoint to connect to.
    #[error("no application endpoint configured; set `application` in app.yaml")]
    NoApplicationEndpoint,
    /// The handshake request failed at the network level.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Remote API URL without query parameters.
        url: String,
        /// The underlying error, stripped of the request URL.
        #[source]
        source: reqwest::Error,
    },
    /// The handler answered with a non-200 status.
    #[error("remote API at {url} answered HTTP {status}: {body}")]
    BadResponse {
        /// Remote API URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Leading part of the body.
        body: String,
    },
    /// The handshake body did not have the expected shape.
    #[error("unexpected remote API handshake response: {body}")]
    Unparseable {
        /// Leading part of the body.
        body: String,
    },
    /// The handler echoed a different token than the one sent.
    #[error("remote API token mismatch: sent {sent}, received {received}")]
    TokenMismatch {
        /// Token sent.
        sent: String,
        /// Token received.
        received: String,
    },
}

/// A verified connection to an application's remote API handler.
#[derive(Debug, Clone)]
pub struct RemoteContext {
    endpoint: Url,
    app_id: String,
    client: Client,
}

impl RemoteContext {
    /// Runs the handshake against `<base>/_ah/remote_api` using `client`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the request fails, the handler rejects it,
    /// or the reply cannot be verified. No retry is attempted.
    #[instrument(skip_all, fields(base = %base))]
    pub async fn connect(base: &Url, client: Client) -> Result<Self, ContextError> {
        let endpoint = base
            .join(REMOTE_API_PATH)
            .map_err(|_| ContextError::InvalidHost {
                host: base.to_string(),
            })?;

        let sent = handshake::new_token();
        let mut url = endpoint.clone();
        url.query_pairs_mut().append_pair("rtok", &sent);
        let response = client
            .get(url)
            .header(API_VERSION_HEADER, "1")
            .send()
            .await
            .map_err(|source| ContextError::Transport {
                url: endpoint.to_string(),
                source: source.without_url(),
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ContextError::Transport {
                url: endpoint.to_string(),
                source: source.without_url(),
            })?;
        debug!(status = status.as_u16(), bytes = body.len(), "handshake answered");

        if status != StatusCode::OK {
            return Err(ContextError::BadResponse {
                url: endpoint.to_string(),
                status: status.as_u16(),
                body: excerpt(&body),
            });
        }

        let reply = handshake::parse_reply(&body).ok_or_else(|| ContextError::Unparseable {
            body: excerpt(&body),
        })?;
        if reply.rtok != sent {
            return Err(ContextError::TokenMismatch {
                sent,
                received: reply.rtok,
            });
        }

        info!(app_id = %reply.app_id, endpoint = %endpoint, "remote API context ready");
        Ok(Self {
            endpoint,
            app_id: reply.app_id,
            client,
        })
    }

    /// Application id reported by the handler (e.g. `s~myapp`).
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Full remote API URL.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Starts a call to the remote API handler with the required headers set.
    ///
    /// The body encoding of individual calls is up to the caller.
    #[must_use]
    pub fn request(&self) -> RequestBuilder {
        self.client
            .post(self.endpoint.clone())
            .header(API_VERSION_HEADER, "1")
            .header(
                CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            )
    }
}

/// Builds a remote API context for `host` (`name[:port]`).
///
/// Loopback hosts use `http`, everything else `https`.
///
/// # Errors
///
/// Returns [`ContextError::InvalidHost`] when `host` does not form a URL and
/// the errors of [`RemoteContext::connect`] otherwise.
pub async fn build_context(host: &str, client: Client) -> Result<RemoteContext, ContextError> {
    let base = host_base_url(host)?;
    RemoteContext::connect(&base, client).await
}

fn host_base_url(host: &str) -> Result<Url, ContextError> {
    let invalid = || ContextError::InvalidHost {
        host: host.to_string(),
    };

    let trimmed = host.trim();
    if trimmed.is_empty() || trimmed.contains(['/', '?', '#', '@']) {
        return Err(invalid());
    }

    let mut url = Url::parse(&format!("http://{trimmed}")).map_err(|_| invalid())?;
    if !is_loopback(url.host()) {
        url.set_scheme("https").map_err(|()| invalid())?;
    }
    Ok(url)
}

fn is_loopback(host: Option<Host<&str>>) -> bool {
    match host {
        Some(Host::Domain(name)) => name.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(addr)) => addr == Ipv6Addr::LOCALHOST,
        None => false,
    }
}

fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_BODY_IN_ERROR) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_string(),
    }
}
