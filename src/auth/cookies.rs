//! Session cookie records and the live cookie jar.
//!
//! [`SessionJar`] serves cookies to `reqwest` through a regular
//! `reqwest::cookie::Jar` and, alongside it, keeps every issued cookie as a
//! plain [`StoredCookie`] record in receipt order. Snapshots of those records,
//! grouped per endpoint into [`CookieTray`]s, are what gets written to disk.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use reqwest::cookie::{CookieStore as ReqwestCookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// A single cookie as issued by a login endpoint.
///
/// The value field is redacted in Debug output to prevent accidental logging
/// of session credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive, never log).
    value: String,
    /// Domain without a leading dot, lowercased.
    pub domain: String,
    /// Whether the cookie only matches `domain` exactly (no `Domain` attribute).
    pub host_only: bool,
    /// URL path scope.
    pub path: String,
    /// Whether the cookie is only sent over HTTPS.
    pub secure: bool,
    /// Whether the cookie carried the `HttpOnly` flag.
    pub http_only: bool,
    /// Unix timestamp for expiry (0 = session cookie).
    pub expires: u64,
}

impl StoredCookie {
    /// Creates a host-only session cookie scoped to `/`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: normalize_domain(&domain.into()),
            host_only: true,
            path: "/".to_string(),
            secure: false,
            http_only: false,
            expires: 0,
        }
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the cookie has a fixed expiry that lies at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires != 0 && self.expires <= unix_seconds(now)
    }

    /// Returns true when a request to `url` at time `now` would carry this cookie.
    #[must_use]
    pub fn matches_url(&self, url: &Url, now: SystemTime) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let host_ok = if self.host_only {
            host == self.domain
        } else {
            domain_matches(&self.domain, &host)
        };
        let request_path = if url.path().is_empty() { "/" } else { url.path() };

        host_ok
            && path_matches(request_path, &self.path)
            && (!self.secure || url.scheme() == "https")
            && !self.is_expired(now)
    }

    /// Builds a `Set-Cookie` header string that reproduces this cookie.
    #[must_use]
    pub fn to_set_cookie_string(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];

        if !self.host_only {
            parts.push(format!("Domain={}", self.domain));
        }
        parts.push(format!("Path={}", self.path));
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }

        // Expires (0 = session cookie, omit Expires)
        if self.expires > 0 {
            if let Some(expires_str) = unix_to_http_date(self.expires) {
                parts.push(format!("Expires={expires_str}"));
            } else {
                warn!(
                    domain = %self.domain,
                    name = %self.name,
                    expires = self.expires,
                    "cookie expiry timestamp overflows SystemTime; treating as session cookie"
                );
            }
        }

        parts.join("; ")
    }

    /// URL the cookie is installed against when restoring it into a jar.
    ///
    /// Uses `https://` for secure cookies and `http://` otherwise.
    fn install_url(&self) -> Option<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}{}", self.domain, self.path).parse().ok()
    }

    fn key(&self) -> CookieKey {
        CookieKey {
            domain: self.domain.clone(),
            path: self.path.clone(),
            name: self.name.clone(),
        }
    }
}

// Custom Debug impl that redacts the cookie value.
impl fmt::Debug for StoredCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCookie")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("host_only", &self.host_only)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expires", &self.expires)
            .finish()
    }
}

/// The cookies issued for one endpoint, in receipt order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieTray {
    /// Absolute URL of the endpoint the cookies belong to.
    pub origin: String,
    /// Cookies in the order the endpoint issued them.
    pub cookies: Vec<StoredCookie>,
}

impl CookieTray {
    /// Creates a tray for `origin`.
    #[must_use]
    pub fn new(origin: impl Into<String>, cookies: Vec<StoredCookie>) -> Self {
        Self {
            origin: origin.into(),
            cookies,
        }
    }

    /// Parses the tray origin, returning `None` for anything but an absolute URL.
    #[must_use]
    pub fn origin_url(&self) -> Option<Url> {
        Url::parse(&self.origin).ok().filter(Url::has_host)
    }
}

/// Parses one `Set-Cookie` header received in response to `request_url`.
///
/// Returns `None` for headers without a `name=value` pair and for cookies
/// whose `Domain` attribute does not cover the request host. A `Max-Age` of
/// zero or less, or an `Expires` in the past, yields an already-expired cookie
/// so the caller can drop any earlier cookie with the same identity.
#[must_use]
pub fn parse_set_cookie(header: &str, request_url: &Url, now: SystemTime) -> Option<StoredCookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let request_host = request_url.host_str()?.to_ascii_lowercase();

    let mut cookie = StoredCookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        domain: request_host.clone(),
        host_only: true,
        path: default_path(request_url),
        secure: false,
        http_only: false,
        expires: 0,
    };
    let mut max_age: Option<i64> = None;
    let mut expires: Option<u64> = None;

    for attribute in parts {
        let (key, attr_value) = match attribute.split_once('=') {
            Some((key, attr_value)) => (key.trim(), attr_value.trim()),
            None => (attribute.trim(), ""),
        };

        match key.to_ascii_lowercase().as_str() {
            "domain" => {
                let domain = normalize_domain(attr_value);
                if domain.is_empty() {
                    continue;
                }
                if !domain_matches(&domain, &request_host) {
                    debug!(
                        name = %cookie.name,
                        domain = %domain,
                        host = %request_host,
                        "rejecting cookie for foreign domain"
                    );
                    return None;
                }
                cookie.domain = domain;
                cookie.host_only = false;
            }
            "path" if attr_value.starts_with('/') => cookie.path = attr_value.to_string(),
            "max-age" => max_age = attr_value.parse::<i64>().ok(),
            "expires" => expires = parse_cookie_date(attr_value),
            "secure" => cookie.secure = true,
            "httponly" => cookie.http_only = true,
            _ => {}
        }
    }

    // Max-Age wins over Expires
    cookie.expires = match max_age {
        Some(seconds) if seconds <= 0 => 1,
        Some(seconds) => unix_seconds(now).saturating_add(seconds.unsigned_abs()),
        None => expires.unwrap_or(0),
    };

    Some(cookie)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CookieKey {
    domain: String,
    path: String,
    name: String,
}

#[derive(Debug)]
struct JarEntry {
    received: u64,
    cookie: StoredCookie,
}

/// Live cookie jar for a session's HTTP client.
///
/// Requests are served by an inner `reqwest::cookie::Jar`; the same cookies are
/// kept as value records so they can be snapshotted per endpoint without
/// reaching into the client.
#[derive(Default)]
pub struct SessionJar {
    live: Jar,
    records: DashMap<CookieKey, JarEntry>,
    received: AtomicU64,
}

impl SessionJar {
    /// Creates an empty jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs all cookies of `tray`. Returns false when the origin is unusable.
    pub fn install_tray(&self, tray: &CookieTray) -> bool {
        let Some(origin) = tray.origin_url() else {
            debug!(origin = %tray.origin, "skipping cookie tray with unparseable origin");
            return false;
        };

        for cookie in &tray.cookies {
            self.install(cookie);
        }
        debug!(origin = %origin, cookies = tray.cookies.len(), "restored cookie tray");
        true
    }

    /// Installs a single cookie into the live jar and the record set.
    pub fn install(&self, cookie: &StoredCookie) {
        let Some(url) = cookie.install_url() else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "skipping cookie with unparseable domain"
            );
            return;
        };

        self.live.add_cookie_str(&cookie.to_set_cookie_string(), &url);
        self.record(cookie.clone(), SystemTime::now());
    }

    /// Returns the cookies a request to `endpoint` would carry, in receipt order.
    #[must_use]
    pub fn snapshot(&self, endpoint: &Url) -> Vec<StoredCookie> {
        let now = SystemTime::now();
        let mut matching: Vec<(u64, StoredCookie)> = self
            .records
            .iter()
            .filter(|entry| entry.cookie.matches_url(endpoint, now))
            .map(|entry| (entry.received, entry.cookie.clone()))
            .collect();
        matching.sort_by_key(|(received, _)| *received);
        matching.into_iter().map(|(_, cookie)| cookie).collect()
    }

    /// Snapshots the cookies for `endpoint` into a tray keyed by its origin.
    #[must_use]
    pub fn tray_for(&self, endpoint: &Url) -> CookieTray {
        CookieTray::new(endpoint_origin(endpoint), self.snapshot(endpoint))
    }

    /// Number of cookies currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when the jar holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, cookie: StoredCookie, now: SystemTime) {
        let key = cookie.key();
        if cookie.is_expired(now) {
            self.records.remove(&key);
            return;
        }

        // A re-issued cookie keeps its original position.
        self.records
            .entry(key)
            .and_modify(|entry| entry.cookie = cookie.clone())
            .or_insert_with(|| JarEntry {
                received: self.received.fetch_add(1, Ordering::Relaxed),
                cookie,
            });
    }
}

impl ReqwestCookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        self.live.set_cookies(&mut headers.iter().copied(), url);

        let now = SystemTime::now();
        for header in headers {
            let Ok(raw) = header.to_str() else {
                debug!(url = %url, "ignoring non-ASCII Set-Cookie header");
                continue;
            };
            match parse_set_cookie(raw, url, now) {
                Some(cookie) => {
                    debug!(url = %url, name = %cookie.name, "received cookie");
                    self.record(cookie, now);
                }
                None => debug!(url = %url, "ignoring malformed Set-Cookie header"),
            }
        }
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.live.cookies(url)
    }
}

impl fmt::Debug for SessionJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionJar")
            .field("cookies", &self.records.len())
            .finish_non_exhaustive()
    }
}

/// `scheme://host[:port]` for an endpoint URL.
#[must_use]
pub fn endpoint_origin(endpoint: &Url) -> String {
    endpoint.origin().ascii_serialization()
}

fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn domain_matches(domain: &str, host: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/') || request_path[cookie_path.len()..].starts_with('/'))
}

/// RFC 6265 default-path: the request path up to, not including, its last `/`.
fn default_path(request_url: &Url) -> String {
    let path = request_url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(index) => path[..index].to_string(),
    }
}

/// Parses a cookie `Expires` value; also accepts the dashed `01-Jan-2030` form.
fn parse_cookie_date(value: &str) -> Option<u64> {
    let time = httpdate::parse_http_date(value)
        .or_else(|_| httpdate::parse_http_date(&value.replace('-', " ")))
        .ok()?;
    // Dates at or before the epoch still count as expired, not as session cookies.
    Some(unix_seconds(time).max(1))
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

/// Converts a Unix timestamp to an HTTP-date string (RFC 7231).
fn unix_to_http_date(timestamp: u64) -> Option<String> {
    let time = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}
