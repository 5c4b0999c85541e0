//! Loopback helpers for tests that talk to wiremock servers.
//!
//! Some sandboxed runners refuse to bind sockets. Tests get their servers from
//! [`mock_servers`] and return early on `None`. Setting
//! `AEREMOTE_REQUIRE_SOCKET_TESTS=1` turns that early return into a failure.

use std::env;
use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::thread;

use wiremock::MockServer;

const REQUIRE_SOCKETS_ENV: &str = "AEREMOTE_REQUIRE_SOCKET_TESTS";

fn free_loopback_port() -> io::Result<u16> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(listener.local_addr()?.port())
}

fn sockets_required() -> bool {
    env::var(REQUIRE_SOCKETS_ENV)
        .is_ok_and(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn loopback_usable() -> bool {
    let Err(error) = free_loopback_port() else {
        return true;
    };
    let test = thread::current().name().unwrap_or("<unnamed>").to_string();
    assert!(
        !sockets_required(),
        "{test}: cannot bind 127.0.0.1 ({error}) and {REQUIRE_SOCKETS_ENV} is set"
    );
    eprintln!("{test}: cannot bind 127.0.0.1 ({error}); skipped");
    false
}

/// Starts `N` mock servers, or `None` when loopback sockets are unavailable.
pub async fn mock_servers<const N: usize>() -> Option<[MockServer; N]> {
    if !loopback_usable() {
        return None;
    }
    let mut servers = Vec::with_capacity(N);
    for _ in 0..N {
        servers.push(MockServer::start().await);
    }
    servers.try_into().ok()
}

#[allow(dead_code)]
pub async fn mock_server() -> Option<MockServer> {
    mock_servers::<1>().await.map(|[server]| server)
}

/// A loopback URL with nothing listening behind it.
#[allow(dead_code)]
pub fn unreachable_url() -> String {
    let port = free_loopback_port().unwrap();
    format!("http://127.0.0.1:{port}")
}
