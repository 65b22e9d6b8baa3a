#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};

struct Server {
    child: Child,
    url: String,
}

impl Server {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_verbmux"))
            .args(["--log-level", "error", "serve", "127.0.0.1:0", "--no-ping"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve should start");

        let stdout = child.stdout.take().expect("stdout should be piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("serve should print its url");
        let url = line.trim().to_string();
        assert!(url.starts_with("ws://127.0.0.1:"), "unexpected url {url:?}");

        Self { child, url }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn send(url: &str, extra: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_verbmux"))
        .args(["--format", "json", "--log-level", "error", "send", url])
        .args(extra)
        .output()
        .expect("send should run")
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_verbmux"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("verbmux {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn extended_version_as_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_verbmux"))
        .args(["--format", "json", "version", "--extended"])
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let info: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("version output should be json");
    assert_eq!(info["name"], "verbmux");
    assert_eq!(info["protocol"]["error_verb"], "error");
    assert_eq!(info["protocol"]["terminator"], 0);
}

#[test]
fn send_echo_round_trip() {
    let server = Server::start();
    let output = send(
        &server.url,
        &["--verb", "echo", "--data", "hello", "--header", "trace=1", "--wait"],
    );

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let resp: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send output should be json");
    assert_eq!(resp["verb"], "echo");
    assert_eq!(resp["status"], 200);
    assert_eq!(resp["payload"], "hello");
}

#[test]
fn send_to_unknown_route_prints_error_and_fails() {
    let server = Server::start();
    let output = send(&server.url, &["--verb", "nowhere", "--data", "x", "--wait"]);

    assert_eq!(output.status.code(), Some(1));
    let resp: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send output should be json");
    assert_eq!(resp["verb"], "error");
    assert_eq!(resp["status"], 404);
    assert_eq!(resp["payload"], "The route \"nowhere\" does not exist");
}

#[test]
fn send_rejects_invalid_json_with_usage_code() {
    let server = Server::start();
    let output = send(&server.url, &["--verb", "echo", "--json", "{nope"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_to_closed_port_fails() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let output = send(&format!("ws://127.0.0.1:{port}/"), &["--verb", "echo"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn send_rejects_non_websocket_url() {
    let output = send("http://127.0.0.1:1/", &["--verb", "echo"]);
    assert_eq!(output.status.code(), Some(64));
}
