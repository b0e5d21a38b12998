// CLI integration tests for p9mux
// Tests the command-line interface functionality

use std::io::{Read, Write};
use std::net::TcpListener;
use std::process::Command;
use std::thread;

use p9mux::channel::codec;
use p9mux::{Frame, Message, Tag, Version};

/// Test that --help flag shows help message with program description
#[test]
fn test_help_flag_shows_help_message() {
    let output = Command::new(env!("CARGO_BIN_EXE_p9mux"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Help should exit with success");
    assert!(
        stdout.contains("p9mux"),
        "Help should contain program name. Got: {}",
        stdout
    );
    assert!(
        stdout.contains("probe"),
        "Help should show probe subcommand. Got: {}",
        stdout
    );
}

/// Test that probe --help documents the address and overrides
#[test]
fn test_probe_help_shows_arguments() {
    let output = Command::new(env!("CARGO_BIN_EXE_p9mux"))
        .args(["probe", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("ADDR"), "Got: {}", stdout);
    assert!(stdout.contains("--msize"), "Got: {}", stdout);
    assert!(stdout.contains("--config"), "Got: {}", stdout);
}

/// Test that probe negotiates with a server and prints its answer
#[test]
fn test_probe_prints_server_version() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let addr = listener.local_addr().unwrap();

    let server = thread::spawn(move || {
        let (mut conn, _) = listener.accept().expect("Failed to accept");
        let mut size = [0u8; 4];
        conn.read_exact(&mut size).unwrap();
        let mut buf = size.to_vec();
        buf.resize(u32::from_le_bytes(size) as usize, 0);
        conn.read_exact(&mut buf[4..]).unwrap();

        let request = codec::decode(&buf).unwrap();
        let Message::Tversion(offer) = request.message else {
            panic!("expected Tversion, got {:?}", request.message);
        };
        assert_eq!(request.tag, Tag::NOTAG);
        assert_eq!(offer.msize, 4096);

        let reply = Frame::new(
            Tag::NOTAG,
            Message::Rversion(Version {
                msize: 2048,
                version: offer.version,
            }),
        );
        conn.write_all(&codec::encode(&reply, 8192).unwrap())
            .unwrap();
    });

    let output = Command::new(env!("CARGO_BIN_EXE_p9mux"))
        .args(["probe", &addr.to_string(), "--msize", "4096"])
        .output()
        .expect("Failed to execute command");
    server.join().unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        output.status.success(),
        "Probe should succeed. stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(stdout.contains("version=9P2000"), "Got: {}", stdout);
    assert!(stdout.contains("msize=2048"), "Got: {}", stdout);
}

/// Test that an invalid configuration file is reported before connecting
#[test]
fn test_probe_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("p9mux.toml");
    std::fs::write(&path, "msize = 3\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_p9mux"))
        .args(["probe", "127.0.0.1:1", "--config"])
        .arg(&path)
        .output()
        .expect("Failed to execute command");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr.contains("msize"), "Got: {}", stderr);
}

/// Test that an unreachable server yields a failing exit status
#[test]
fn test_probe_unreachable_server_fails() {
    // Bind then drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_p9mux"))
        .args(["probe", &addr.to_string(), "--timeout-ms", "2000"])
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error"));
}
