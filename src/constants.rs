//! Fixed endpoints, login parameters and timeouts.

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default total request timeout (60 seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Service endpoint host for remote mode.
pub const REMOTE_SERVICE_HOST: &str = "appengine.google.com";

/// Domain suffix appended to the application identifier in remote mode.
pub const REMOTE_APP_DOMAIN: &str = "appspot.com";

/// Service endpoint host for local mode (development admin server).
pub const LOCAL_SERVICE_HOST: &str = "localhost:8000";

/// Application endpoint host for local mode (development app server).
pub const LOCAL_APP_HOST: &str = "localhost:8080";

/// Identity provider login endpoint.
pub const IDENTITY_PROVIDER_URL: &str = "https://www.google.com/accounts/ClientLogin";

/// Client identifier sent to the identity provider as `source`.
pub const CLIENT_SOURCE: &str = "Google-appcfg-1.9.17";

/// Account type sent to the identity provider.
pub const ACCOUNT_TYPE: &str = "HOSTED_OR_GOOGLE";

/// Service name sent to the identity provider.
pub const AUTH_SERVICE: &str = "ah";

/// Login path on both the service and application endpoints.
pub const LOGIN_PATH: &str = "/_ah/login";

/// Callback marker sent as `continue` on login requests.
pub const LOGIN_CONTINUE: &str = "http://localhost";

/// Remote API handler path on the application endpoint.
pub const REMOTE_API_PATH: &str = "/_ah/remote_api";

/// Cookie file name under the user's home directory.
pub const COOKIE_FILE_NAME: &str = ".cookies";
