//! Integration tests for the GeoSync CLI.
//!
//! These tests exercise the binary end-to-end using `assert_cmd`.
//! Prompts are avoided with `GEOSYNC_PASSWORD`, and every test gets its own
//! data directory and `HOME` so nothing touches the real vault or config.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::process::{Child, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use assert_fs::TempDir;
use predicates::prelude::*;

const PASSWORD: &str = "correct horse battery";

/// Helper: get a Command pointing at the geosync binary, isolated from the
/// caller's environment.
fn geosync(home: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("geosync").expect("binary should exist");
    cmd.env("HOME", home)
        .env("GEOSYNC_DATA_DIR", home.join("data"))
        .env_remove("GEOSYNC_TOKEN")
        .env_remove("GEOSYNC_PASSWORD")
        .env_remove("GEOSYNC_PORT")
        .env_remove("GEOSYNC_HOST")
        .env_remove("RUST_LOG");
    cmd
}

/// A home directory whose vault uses cheap key derivation.
fn fast_home() -> TempDir {
    let home = TempDir::new().unwrap();
    let data = home.path().join("data");
    std::fs::create_dir_all(&data).unwrap();
    std::fs::write(data.join("geosync.toml"), "kdf_iterations = 1000\n").unwrap();
    home
}

/// A port nothing is listening on.
fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Run a host command with the password supplied through the environment.
fn host(home: &Path, args: &[&str]) -> assert_cmd::assert::Assert {
    geosync(home)
        .env("GEOSYNC_PASSWORD", PASSWORD)
        .args(args)
        .assert()
}

/// Initialize the vault and build project `Acme` / environment `prod`.
fn setup_acme(home: &Path) {
    host(home, &["init", "--name", "Ada"]).success();
    host(home, &["project", "create", "Acme", "--org", "Acme Corp"]).success();
    host(home, &["env", "create", "--project", "Acme", "Production", "--slug", "prod"]).success();
    host(home, &["var", "set", "--project", "Acme", "API_URL", "https://api.dev"]).success();
    host(
        home,
        &["var", "set", "--project", "Acme", "--env", "prod", "API_URL", "https://api.prod"],
    )
    .success();
    host(home, &["var", "set", "--project", "Acme", "--secret", "API_KEY", "sk-live-123"]).success();
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

#[test]
fn help_flag_shows_usage() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Local secrets vault"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("list-projects"))
        .stdout(predicate::str::contains("get-env"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn version_flag_shows_version() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("geosync"));
}

#[test]
fn no_args_exits_with_one() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn run_without_project_is_a_usage_error() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .args(["run", "--env", "prod", "--", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("--project"));
}

#[test]
fn run_without_command_fails() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .args(["run", "--project", "Acme", "--env", "prod"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No command provided"));
}

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

#[test]
fn set_token_writes_config_file() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .args(["config", "set-token", "gsk_abc123"])
        .assert()
        .success();

    let config = std::fs::read_to_string(home.path().join(".geosync/config.json")).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&config).unwrap();
    assert_eq!(parsed["token"], "gsk_abc123");
    assert!(parsed.get("masterKeyHash").is_none());
}

#[test]
fn client_without_token_explains_how_to_set_one() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .arg("list-projects")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("set-token"));
}

#[test]
fn client_without_server_says_to_start_the_app() {
    let home = TempDir::new().unwrap();
    geosync(home.path())
        .env("GEOSYNC_TOKEN", "gsk_abc")
        .args(["--port", &free_port().to_string(), "list-projects"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Make sure the GeoSync app is running"));
}

// ---------------------------------------------------------------------------
// Vault host administration
// ---------------------------------------------------------------------------

#[test]
fn init_twice_fails() {
    let home = fast_home();
    host(home.path(), &["init"]).success();
    host(home.path(), &["init"])
        .code(1)
        .stderr(predicate::str::contains("already configured"));
}

#[test]
fn short_password_is_rejected_at_init() {
    let home = fast_home();
    geosync(home.path())
        .env("GEOSYNC_PASSWORD", "short")
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("at least 8 characters"));
}

#[test]
fn var_show_masks_secrets_and_marks_overrides() {
    let home = fast_home();
    setup_acme(home.path());

    host(home.path(), &["var", "show", "--project", "Acme", "--env", "prod"])
        .success()
        .stdout(predicate::str::contains("https://api.prod"))
        .stdout(predicate::str::contains("override"))
        .stdout(predicate::str::contains("sk-live-123").not());

    host(home.path(), &["var", "show", "--project", "acme", "--env", "prod", "--reveal"])
        .success()
        .stdout(predicate::str::contains("sk-live-123"));
}

#[test]
fn unsetting_an_override_falls_back_to_the_default() {
    let home = fast_home();
    setup_acme(home.path());

    host(home.path(), &["var", "unset", "--project", "Acme", "--env", "prod", "API_URL"]).success();
    host(home.path(), &["var", "show", "--project", "Acme", "--env", "prod"])
        .success()
        .stdout(predicate::str::contains("https://api.dev"));
}

#[test]
fn wrong_password_is_rejected() {
    let home = fast_home();
    setup_acme(home.path());

    geosync(home.path())
        .env("GEOSYNC_PASSWORD", "definitely wrong")
        .args(["var", "show", "--project", "Acme", "--env", "prod"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid master password"));
}

#[test]
fn unknown_project_is_reported() {
    let home = fast_home();
    host(home.path(), &["init"]).success();
    host(home.path(), &["env", "create", "--project", "Nope", "dev"])
        .code(1)
        .stderr(predicate::str::contains("Project \"Nope\" not found"));
}

#[test]
fn token_create_shows_the_token_once_and_audit_records_it() {
    let home = fast_home();
    host(home.path(), &["init"]).success();

    host(home.path(), &["token", "create", "laptop", "--expires-in-days", "30"])
        .success()
        .stdout(predicate::str::contains("gsk_"));
    host(home.path(), &["token", "list"])
        .success()
        .stdout(predicate::str::contains("laptop"))
        .stdout(predicate::str::contains("gsk_").not());
    host(home.path(), &["audit", "--since", "1h"])
        .success()
        .stdout(predicate::str::contains("token_issue"));
}

// ---------------------------------------------------------------------------
// Client against a live vault host
// ---------------------------------------------------------------------------

/// `geosync serve` running in the background; killed on drop.
struct Server {
    child: Child,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_server(home: &Path, port: u16) -> Server {
    #[allow(deprecated)]
    let bin = assert_cmd::cargo::cargo_bin("geosync");
    let child = std::process::Command::new(bin)
        .env("HOME", home)
        .env("GEOSYNC_DATA_DIR", home.join("data"))
        .args(["--port", &port.to_string(), "serve"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let server = Server { child };

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let deadline = Instant::now() + Duration::from_secs(10);
    while TcpStream::connect(addr).is_err() {
        assert!(Instant::now() < deadline, "server did not start");
        std::thread::sleep(Duration::from_millis(50));
    }
    server
}

fn issue_token(home: &Path) -> String {
    let output = geosync(home)
        .args(["token", "create", "e2e"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let start = stdout.find("gsk_").expect("token in output");
    stdout[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

#[test]
fn get_env_and_run_against_a_live_server() {
    let home = fast_home();
    setup_acme(home.path());
    let token = issue_token(home.path());
    let port = free_port().to_string();
    let _server = spawn_server(home.path(), port.parse().unwrap());

    geosync(home.path())
        .env("GEOSYNC_TOKEN", &token)
        .args(["--port", &port, "list-projects"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Acme"))
        .stdout(predicate::str::contains("prod"));

    let output = geosync(home.path())
        .env("GEOSYNC_TOKEN", &token)
        .env("GEOSYNC_PASSWORD", PASSWORD)
        .args(["--port", &port, "get-env", "--project", "acme", "--env", "prod"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, ["API_KEY=sk-live-123", "API_URL=https://api.prod"]);

    geosync(home.path())
        .env("GEOSYNC_TOKEN", &token)
        .env("GEOSYNC_PASSWORD", PASSWORD)
        .args(["--port", &port, "get-env", "--project", "Acme", "--env", "staging"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("staging"));
}

#[test]
fn unknown_environment_is_reported_before_asking_for_the_password() {
    let home = fast_home();
    setup_acme(home.path());
    let token = issue_token(home.path());
    let port = free_port().to_string();
    let _server = spawn_server(home.path(), port.parse().unwrap());

    geosync(home.path())
        .env("GEOSYNC_TOKEN", &token)
        .args(["--port", &port, "get-env", "--project", "Acme", "--env", "staging"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Environment \"staging\" not found"))
        .stderr(predicate::str::contains("Available environments: prod"))
        .stderr(predicate::str::contains("password").not());

    geosync(home.path())
        .env("GEOSYNC_TOKEN", &token)
        .args(["--port", &port, "run", "--project", "Globex", "--env", "prod", "--", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Available projects: Acme"));
}

#[cfg(unix)]
#[test]
fn run_injects_variables_and_forwards_exit_code() {
    let home = fast_home();
    setup_acme(home.path());
    let token = issue_token(home.path());
    let port = free_port().to_string();
    let _server = spawn_server(home.path(), port.parse().unwrap());

    geosync(home.path())
        .env("GEOSYNC_TOKEN", &token)
        .env("GEOSYNC_PASSWORD", PASSWORD)
        .args(["--port", &port, "run", "--project", "Acme", "--env", "prod", "--"])
        .args(["sh", "-c", "test \"$API_URL\" = https://api.prod && exit 7"])
        .assert()
        .code(7);
}
