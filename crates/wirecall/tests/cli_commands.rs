#![cfg(feature = "cli")]

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Output, Stdio};

struct ServeProcess {
    child: Child,
    port: u16,
}

impl ServeProcess {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_wirecall"))
            .args(["--log-level", "error", "--format", "json", "serve"])
            .args(["--host", "127.0.0.1", "--port", "0"])
            .env_remove("WIRECALL_HOST")
            .env_remove("WIRECALL_PORT")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve command should start");

        let stdout = child.stdout.take().expect("stdout should be piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("serve should announce its address");

        let announced: serde_json::Value =
            serde_json::from_str(&line).expect("announcement should be JSON");
        let addr: std::net::SocketAddr = announced["listening"]
            .as_str()
            .expect("listening field")
            .parse()
            .expect("listening should be an address");

        Self {
            child,
            port: addr.port(),
        }
    }

    fn call(&self, method_and_args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_wirecall"))
            .args(["--log-level", "error", "--format", "json", "call"])
            .args(method_and_args)
            .args(["--port", &self.port.to_string(), "--timeout", "5s"])
            .env_remove("WIRECALL_HOST")
            .env_remove("WIRECALL_PORT")
            .output()
            .expect("call should run")
    }
}

impl Drop for ServeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).expect("stdout should be one JSON document")
}

#[test]
fn call_add_against_serve() {
    let server = ServeProcess::start();

    let output = server.call(&["add", "40", "2"]);
    assert!(output.status.success(), "{output:?}");
    let json = stdout_json(&output);
    assert_eq!(json["method"], "add");
    assert_eq!(json["result"]["number"], 42);
}

#[test]
fn call_echo_joins_arguments() {
    let server = ServeProcess::start();

    let output = server.call(&["echo", "hello", "there"]);
    assert!(output.status.success(), "{output:?}");
    assert_eq!(stdout_json(&output)["result"]["text"], "hello there");
}

#[test]
fn performer_failure_exits_1_with_message() {
    let server = ServeProcess::start();

    let output = server.call(&["fail", "boom"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("application error: boom"), "{stderr}");
}

#[test]
fn call_timeout_exits_124() {
    let server = ServeProcess::start();

    let output = Command::new(env!("CARGO_BIN_EXE_wirecall"))
        .args(["--log-level", "error", "call", "sleep", "2000"])
        .args(["--port", &server.port.to_string(), "--timeout", "100ms"])
        .env_remove("WIRECALL_HOST")
        .output()
        .expect("call should run");
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn unreachable_server_exits_3() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };

    let output = Command::new(env!("CARGO_BIN_EXE_wirecall"))
        .args(["--log-level", "error", "call", "add", "1", "2"])
        .args(["--host", "127.0.0.1", "--port", &port.to_string()])
        .args(["--attempts", "2"])
        .output()
        .expect("call should run");
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("after 2 attempt(s)"), "{stderr}");
}

#[test]
fn bad_method_arguments_exit_64() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirecall"))
        .args(["call", "add", "one", "two"])
        .output()
        .expect("call should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirecall"))
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(
        stdout.trim(),
        format!("wirecall {}", env!("CARGO_PKG_VERSION"))
    );
}
