//! Session construction and cookie restore.
//!
//! A [`Session`] fixes the endpoints for one invocation (local development
//! servers or the hosted service), restores persisted cookies into a live jar
//! and owns the HTTP client that carries them.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{CookieStore, CookieTray, Credentials, SessionJar, SigninError, SigninReport};
use crate::config::{AppDescriptor, ToolConfig};
use crate::constants::{
    CONNECT_TIMEOUT_SECS, IDENTITY_PROVIDER_URL, LOCAL_APP_HOST, LOCAL_SERVICE_HOST,
    REMOTE_APP_DOMAIN, REMOTE_SERVICE_HOST, REQUEST_TIMEOUT_SECS,
};
use crate::remote::{ContextError, RemoteContext};
use crate::user_agent::default_user_agent;

/// Errors while constructing a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An endpoint derived from the configuration is not a valid URL.
    #[error("invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        /// The endpoint as formed.
        endpoint: String,
        /// Parse failure.
        #[source]
        source: url::ParseError,
    },
    /// The session HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Inputs for [`Session::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Talk to the local development servers instead of the hosted service.
    pub local: bool,
    /// Application identifier; may be empty.
    pub application: String,
    /// Application version label, informational.
    pub version: String,
    /// Overrides the mode's service endpoint.
    pub service_endpoint: Option<Url>,
    /// Overrides the mode's application endpoint.
    pub application_endpoint: Option<Url>,
    /// Overrides the identity provider URL.
    pub identity_provider: Option<Url>,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// Total HTTP request timeout.
    pub request_timeout: Duration,
}

impl SessionOptions {
    /// Options with default endpoints and timeouts.
    #[must_use]
    pub fn new(local: bool, application: impl Into<String>) -> Self {
        Self {
            local,
            application: application.into(),
            version: String::new(),
            service_endpoint: None,
            application_endpoint: None,
            identity_provider: None,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Options for the application described by `descriptor`.
    #[must_use]
    pub fn from_descriptor(local: bool, descriptor: &AppDescriptor) -> Self {
        let mut options = Self::new(local, descriptor.application.trim());
        options.version = descriptor.version.clone();
        options
    }

    /// Applies endpoint and timeout overrides from the tool config.
    #[must_use]
    pub fn with_config(mut self, config: &ToolConfig) -> Self {
        if let Some(url) = &config.service_endpoint {
            self.service_endpoint = Some(url.clone());
        }
        if let Some(url) = &config.application_endpoint {
            self.application_endpoint = Some(url.clone());
        }
        if let Some(url) = &config.identity_provider_url {
            self.identity_provider = Some(url.clone());
        }
        if let Some(secs) = config.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = config.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        self
    }
}

/// Endpoints, cookie state and HTTP client for one invocation.
#[derive(Debug)]
pub struct Session {
    local: bool,
    application: String,
    version: String,
    service_endpoint: Url,
    application_endpoint: Option<Url>,
    identity_provider: Url,
    connect_timeout: Duration,
    request_timeout: Duration,
    store: CookieStore,
    jar: Arc<SessionJar>,
    client: Client,
    restored_trays: usize,
}

impl Session {
    /// Resolves endpoints, restores cookies from `store` and builds the client.
    ///
    /// An unreadable cookie file is not an error: the session starts with an
    /// empty jar and a warning is logged.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidEndpoint`] when an endpoint URL cannot be formed
    /// - [`SessionError::Client`] when the HTTP client cannot be built
    pub fn open(options: SessionOptions, store: CookieStore) -> Result<Self, SessionError> {
        let (service_endpoint, application_endpoint) = resolve_endpoints(&options)?;
        let identity_provider = match options.identity_provider {
            Some(url) => url,
            None => parse_endpoint(IDENTITY_PROVIDER_URL.to_string())?,
        };

        let trays = match store.load() {
            Ok(trays) => trays,
            Err(error) => {
                warn!(
                    path = %store.path().display(),
                    error = %error,
                    "could not read saved cookies; continuing without them"
                );
                Vec::new()
            }
        };
        let jar = SessionJar::new();
        let restored_trays = trays.iter().filter(|tray| jar.install_tray(tray)).count();
        let jar = Arc::new(jar);

        let client = base_client_builder(options.connect_timeout, options.request_timeout)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(SessionError::Client)?;

        let session = Self {
            local: options.local,
            application: options.application,
            version: options.version,
            service_endpoint,
            application_endpoint,
            identity_provider,
            connect_timeout: options.connect_timeout,
            request_timeout: options.request_timeout,
            store,
            jar,
            client,
            restored_trays,
        };

        debug!(
            local = session.local,
            service = %session.service_endpoint,
            application = ?session.application_endpoint.as_ref().map(Url::as_str),
            restored_trays,
            cookies = session.jar.len(),
            "session opened"
        );
        Ok(session)
    }

    /// True when talking to the local development servers.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Application identifier; may be empty.
    #[must_use]
    pub fn application(&self) -> &str {
        &self.application
    }

    /// Application version label.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn service_endpoint(&self) -> &Url {
        &self.service_endpoint
    }

    /// Application endpoint; `None` in remote mode without an identifier or override.
    #[must_use]
    pub fn application_endpoint(&self) -> Option<&Url> {
        self.application_endpoint.as_ref()
    }

    #[must_use]
    pub fn identity_provider(&self) -> &Url {
        &self.identity_provider
    }

    /// The cookie file backing this session.
    #[must_use]
    pub fn cookie_store(&self) -> &CookieStore {
        &self.store
    }

    /// The live jar shared with [`Session::client`].
    #[must_use]
    pub fn jar(&self) -> &Arc<SessionJar> {
        &self.jar
    }

    /// HTTP client that sends the session cookies.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Number of trays restored from the cookie file at open time.
    #[must_use]
    pub fn restored_trays(&self) -> usize {
        self.restored_trays
    }

    /// A client builder carrying this session's timeouts and user agent, without cookies.
    #[must_use]
    pub fn http_client_builder(&self) -> ClientBuilder {
        base_client_builder(self.connect_timeout, self.request_timeout)
    }

    /// Installs trays into the live jar, skipping unusable origins.
    pub fn install_trays(&self, trays: &[CookieTray]) {
        let installed = trays
            .iter()
            .filter(|tray| self.jar.install_tray(tray))
            .count();
        debug!(installed, offered = trays.len(), "installed cookie trays");
    }

    /// Signs in with `credentials` and persists the issued cookies.
    ///
    /// # Errors
    ///
    /// See [`crate::auth::sign_in`].
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<SigninReport, SigninError> {
        crate::auth::sign_in(self, credentials).await
    }

    /// Deletes the cookie file. Returns false when there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns [`crate::auth::StorageError`] when the file exists but cannot be removed.
    pub fn sign_out(&self) -> Result<bool, crate::auth::StorageError> {
        let removed = self.store.clear()?;
        debug!(path = %self.store.path().display(), removed, "sign-out finished");
        Ok(removed)
    }

    /// Builds an authenticated remote API context against the application endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::NoApplicationEndpoint`] when the session has no
    /// application endpoint, and the handshake errors otherwise.
    pub async fn context(&self) -> Result<RemoteContext, ContextError> {
        let endpoint = self
            .application_endpoint
            .as_ref()
            .ok_or(ContextError::NoApplicationEndpoint)?;
        RemoteContext::connect(endpoint, self.client.clone()).await
    }
}

fn base_client_builder(connect_timeout: Duration, request_timeout: Duration) -> ClientBuilder {
    Client::builder()
        .user_agent(default_user_agent())
        .connect_timeout(connect_timeout)
        .timeout(request_timeout)
}

fn resolve_endpoints(options: &SessionOptions) -> Result<(Url, Option<Url>), SessionError> {
    let service = match &options.service_endpoint {
        Some(url) => url.clone(),
        None if options.local => parse_endpoint(format!("http://{LOCAL_SERVICE_HOST}"))?,
        None => parse_endpoint(format!("https://{REMOTE_SERVICE_HOST}"))?,
    };

    let application = match &options.application_endpoint {
        Some(url) => Some(url.clone()),
        None if options.local => Some(parse_endpoint(format!("http://{LOCAL_APP_HOST}"))?),
        None if options.application.is_empty() => None,
        None => Some(parse_endpoint(format!(
            "https://{}.{REMOTE_APP_DOMAIN}",
            options.application
        ))?),
    };
    Ok((service, application))
}

fn parse_endpoint(endpoint: String) -> Result<Url, SessionError> {
    Url::parse(&endpoint).map_err(|source| SessionError::InvalidEndpoint { endpoint, source })
}
