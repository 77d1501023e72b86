#![cfg(all(unix, feature = "cli"))]

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/portwire-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn make_fifo(dir: &Path) -> PathBuf {
    let path = dir.join("link");
    let status = Command::new("mkfifo")
        .arg(&path)
        .status()
        .expect("mkfifo should run");
    assert!(status.success(), "mkfifo failed");
    path
}

fn portwire() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_portwire"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("stdout line should be JSON"))
        .collect()
}

fn wait_with_deadline(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        if child.try_wait().expect("child should be pollable").is_some() {
            return child.wait_with_output().expect("child output");
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let output = child.wait_with_output().expect("child output");
            panic!(
                "command did not finish; stderr: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn decode_prints_frames_as_json() {
    let output = portwire()
        .arg("--format")
        .arg("json")
        .arg("decode")
        .arg("--hex")
        .arg("AA 55 01 AA 55 03 01 02 03")
        .arg("--response-head")
        .arg("AA55")
        .arg("--length-offset")
        .arg("2")
        .arg("--length-adjust")
        .arg("3")
        .output()
        .expect("decode should run");

    assert!(output.status.success());
    let frames = json_lines(&output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["kind"], "response");
    assert_eq!(frames[0]["hex"], "AA5503010203");
    assert_eq!(frames[0]["length"], 6);
}

#[test]
fn decode_rejects_bad_hex() {
    let output = portwire()
        .arg("decode")
        .arg("--hex")
        .arg("XYZ")
        .arg("--fixed-length")
        .arg("2")
        .output()
        .expect("decode should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_prints_package_version() {
    let output = portwire()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("portwire "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn send_to_missing_device_is_transport_error() {
    let dir = unique_temp_dir("missing");
    let output = portwire()
        .arg("send")
        .arg(dir.join("absent"))
        .arg("--hex")
        .arg("AA5500")
        .arg("--response-head")
        .arg("AA55")
        .arg("--fixed-length")
        .arg("3")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn send_over_fifo_loopback_reads_own_frame() {
    let dir = unique_temp_dir("loopback");
    let fifo = make_fifo(&dir);

    let output = portwire()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(&fifo)
        .arg("--hex")
        .arg("AA5500")
        .arg("--response-head")
        .arg("AA55")
        .arg("--length-offset")
        .arg("2")
        .arg("--length-adjust")
        .arg("3")
        .output()
        .expect("send should run");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let frames = json_lines(&output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["kind"], "response");
    assert_eq!(frames[0]["hex"], "AA5500");
}

#[test]
fn send_without_reply_times_out() {
    let dir = unique_temp_dir("timeout");
    let fifo = make_fifo(&dir);

    let started = Instant::now();
    let output = portwire()
        .arg("send")
        .arg(&fifo)
        .arg("--hex")
        .arg("0102")
        .arg("--response-head")
        .arg("AA55")
        .arg("--fixed-length")
        .arg("3")
        .arg("--timeout")
        .arg("200ms")
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(124));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[test]
fn listen_prints_request_frames() {
    let dir = unique_temp_dir("listen");
    let fifo = make_fifo(&dir);

    let child = portwire()
        .arg("--format")
        .arg("json")
        .arg("listen")
        .arg(&fifo)
        .arg("--request-head")
        .arg("BB66")
        .arg("--fixed-length")
        .arg("3")
        .arg("--interrupt-prefix")
        .arg("BB66EE")
        .arg("--count")
        .arg("2")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("listen should start");

    // A non-blocking write open fails with ENXIO until the listener holds the FIFO.
    let start = Instant::now();
    let mut writer = loop {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&fifo)
        {
            Ok(file) => break file,
            Err(err) => {
                assert!(
                    start.elapsed() < Duration::from_secs(5),
                    "listener never opened the fifo: {err}"
                );
                thread::sleep(Duration::from_millis(20));
            }
        }
    };
    writer
        .write_all(&[0x00, 0xBB, 0x66, 0x01, 0xBB, 0x66, 0xEE])
        .expect("fifo write");
    drop(writer);

    let output = wait_with_deadline(child, Duration::from_secs(5));
    assert!(output.status.success());
    let frames = json_lines(&output);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["hex"], "BB6601");
    assert_eq!(frames[0]["interrupt"], false);
    assert_eq!(frames[1]["hex"], "BB66EE");
    assert_eq!(frames[1]["interrupt"], true);
}
