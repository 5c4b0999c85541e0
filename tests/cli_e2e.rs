//! End-to-end CLI tests for the aeremote binary.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

mod support;
use support::loopback::mock_server;

const APP_YAML: &str = "application: myapp\nversion: 2\nruntime: go\napi_version: go1\n";

/// Command with HOME and the config dir pointed at `home`.
fn aeremote(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("aeremote").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("NO_COLOR", "1")
        .env_remove("AEREMOTE_COOKIE_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn write_app_dir(root: &Path) -> std::path::PathBuf {
    let app_dir = root.join("app");
    fs::create_dir_all(&app_dir).unwrap();
    fs::write(app_dir.join("app.yaml"), APP_YAML).unwrap();
    app_dir
}

fn write_tool_config(home: &Path, contents: &str) {
    let dir = home.join(".config").join("aeremote");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.toml"), contents).unwrap();
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    aeremote(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sign in to an App Engine application"))
        .stdout(predicate::str::contains("signin"))
        .stdout(predicate::str::contains("signout"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    aeremote(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("aeremote"));
}

#[test]
fn test_binary_without_command_fails() {
    let home = TempDir::new().unwrap();
    aeremote(home.path()).assert().failure();
}

#[test]
fn test_signout_removes_cookie_file() {
    let home = TempDir::new().unwrap();
    let cookie_file = home.path().join(".cookies");
    fs::write(&cookie_file, br#"{"version":1,"trays":[]}"#).unwrap();

    aeremote(home.path()).arg("signout").assert().success();
    assert!(!cookie_file.exists());
}

#[test]
fn test_signout_without_saved_session_succeeds() {
    let home = TempDir::new().unwrap();
    aeremote(home.path())
        .arg("signout")
        .assert()
        .success()
        .stderr(predicate::str::contains("No saved session found"));
}

#[test]
fn test_signout_honors_configured_cookie_file() {
    let home = TempDir::new().unwrap();
    let custom = home.path().join("custom-cookies.json");
    fs::write(&custom, b"{}").unwrap();
    write_tool_config(
        home.path(),
        &format!("cookie_file = \"{}\"\n", custom.display()),
    );

    aeremote(home.path()).arg("signout").assert().success();
    assert!(!custom.exists());
}

#[test]
fn test_status_local_prints_endpoints() {
    let home = TempDir::new().unwrap();
    let app_dir = write_app_dir(home.path());

    aeremote(home.path())
        .args(["--local", "status", "--app-dir"])
        .arg(&app_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("mode = local"))
        .stdout(predicate::str::contains("application = myapp"))
        .stdout(predicate::str::contains("version = 2"))
        .stdout(predicate::str::contains("service_endpoint = http://localhost:8000/"))
        .stdout(predicate::str::contains(
            "application_endpoint = http://localhost:8080/",
        ))
        .stdout(predicate::str::contains("cookie_file_state = absent"))
        .stdout(predicate::str::contains("config_file = not found (using defaults)"));
}

#[test]
fn test_status_remote_prints_appspot_endpoint() {
    let home = TempDir::new().unwrap();
    let app_dir = write_app_dir(home.path());

    aeremote(home.path())
        .arg("status")
        .arg("--app-dir")
        .arg(&app_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("mode = remote"))
        .stdout(predicate::str::contains(
            "service_endpoint = https://appengine.google.com/",
        ))
        .stdout(predicate::str::contains(
            "application_endpoint = https://myapp.appspot.com/",
        ));
}

#[test]
fn test_status_remote_without_application_has_no_application_endpoint() {
    let home = TempDir::new().unwrap();
    let app_dir = home.path().join("app");
    fs::create_dir_all(&app_dir).unwrap();
    fs::write(app_dir.join("app.yaml"), "runtime: go\napi_version: go1\n").unwrap();

    aeremote(home.path())
        .arg("status")
        .arg("--app-dir")
        .arg(&app_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("mode = remote"))
        .stdout(predicate::str::contains("application_endpoint = <none>"));
}

#[test]
fn test_status_with_corrupt_cookie_file_still_succeeds() {
    let home = TempDir::new().unwrap();
    let app_dir = write_app_dir(home.path());
    fs::write(home.path().join(".cookies"), b"not json").unwrap();

    aeremote(home.path())
        .args(["--local", "status", "--app-dir"])
        .arg(&app_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("cookie_file_state = present"))
        .stdout(predicate::str::contains("cookies = 0"))
        .stderr(predicate::str::contains("could not read saved cookies"));
}

#[test]
fn test_status_without_app_yaml_fails() {
    let home = TempDir::new().unwrap();

    aeremote(home.path())
        .arg("status")
        .arg("--app-dir")
        .arg(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("application descriptor"));
}

#[test]
fn test_unknown_config_key_fails() {
    let home = TempDir::new().unwrap();
    write_tool_config(home.path(), "concurrency = 3\n");

    aeremote(home.path())
        .arg("signout")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config file"))
        .stderr(predicate::str::contains("unknown configuration key"));
}

struct EchoToken;

impl Respond for EchoToken {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let rtok = request
            .url
            .query_pairs()
            .find(|(key, _)| key == "rtok")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_string(format!("{{app_id: 's~myapp', rtok: '{rtok}'}}"))
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_info_prints_app_id_from_remote_api() {
    let Some(server) = mock_server().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/_ah/remote_api"))
        .respond_with(EchoToken)
        .expect(1)
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let app_dir = write_app_dir(home.path());
    write_tool_config(
        home.path(),
        &format!("application_endpoint = \"{}\"\n", server.uri()),
    );

    let mut cmd = aeremote(home.path());
    cmd.arg("info").arg("--app-dir").arg(&app_dir);
    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();
    assert
        .success()
        .stdout(predicate::str::contains("app_id = s~myapp"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_info_failure_suggests_signin() {
    let Some(server) = mock_server().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/_ah/remote_api"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let home = TempDir::new().unwrap();
    let app_dir = write_app_dir(home.path());
    write_tool_config(
        home.path(),
        &format!("application_endpoint = \"{}\"\n", server.uri()),
    );

    let mut cmd = aeremote(home.path());
    cmd.arg("info").arg("--app-dir").arg(&app_dir);
    let assert = tokio::task::spawn_blocking(move || cmd.assert())
        .await
        .unwrap();
    assert
        .failure()
        .stderr(predicate::str::contains("aeremote signin"));
}
