//! End-to-end tests of the node binary.

use std::io::Write;
use std::net::TcpListener;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

const BIN: &str = env!("CARGO_BIN_EXE_p2pminer-node");

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[test]
fn test_missing_arguments_exit_with_usage_error() {
    let output = Command::new(BIN).arg("8000").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WORKER_IDENTITY"), "stderr: {stderr}");
}

#[test]
fn test_stop_command_shuts_node_down() {
    let port = free_port();
    let dead_seed = free_port();

    let mut child = Command::new(BIN)
        .args([
            port.to_string().as_str(),
            "wallet-abc",
            "--bind",
            "127.0.0.1",
            "--seed",
            &format!("127.0.0.1:{dead_seed}"),
            "--no-worker",
            "--log-level",
            "warn",
        ])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    {
        let stdin = child.stdin.as_mut().unwrap();
        stdin.write_all(b"list-peers\nnot-a-command\n\nstop\n").unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(20);
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            assert!(status.success(), "node exited with {status}");
            break;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("node did not stop");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
