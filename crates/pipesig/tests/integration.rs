//! Integration tests for pipesig
//!
//! These tests run the real binary with real children and check what the
//! controller observes on its end of the streams.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn pipesig() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pipesig"));
    cmd.env_remove("RUST_LOG")
        .env_remove("PIPESIG_LOG")
        .env_remove("PIPESIG_BUFFER_SIZE")
        .env_remove("PIPESIG_TERM_GRACE_MS");
    cmd
}

fn run_with_input(args: &[&str], input: &[u8]) -> Output {
    let mut child = pipesig()
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    let mut stdin = child.stdin.take().unwrap();
    let input = input.to_vec();
    let writer = thread::spawn(move || {
        stdin.write_all(&input).unwrap();
    });

    let output = child.wait_with_output().unwrap();
    writer.join().unwrap();
    output
}

fn wait_with_timeout(child: &mut Child, limit: Duration) -> Option<ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().unwrap() {
            return Some(status);
        }
        if start.elapsed() > limit {
            let _ = child.kill();
            return None;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

const ECHO_SCRIPT: &str = r#"while IFS= read -r line; do printf 'ECHO: %s\n' "$line"; done"#;

#[test]
fn test_usage_without_command() {
    let output = pipesig().stdin(Stdio::null()).output().unwrap();

    assert_eq!(output.status.code(), Some(255));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Usage"), "stderr was: {stderr}");
}

#[test]
fn test_help_exits_zero() {
    let output = pipesig().arg("--help").output().unwrap();
    assert!(output.status.success());
}

#[test]
fn test_echo_scenario() {
    let output = run_with_input(&["sh", "-c", ECHO_SCRIPT], b"hello\n");

    assert_eq!(output.stdout, b"ECHO: hello\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_multiple_lines_in_order() {
    let output = run_with_input(&["sh", "-c", ECHO_SCRIPT], b"one\ntwo\nthree\n");

    assert_eq!(output.stdout, b"ECHO: one\nECHO: two\nECHO: three\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_child_exit_code_is_returned() {
    let output = pipesig()
        .args(["sh", "-c", "exit 7"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn test_child_killed_by_signal() {
    let output = pipesig()
        .args(["sh", "-c", "kill -9 $$"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(128 + 9));
}

#[test]
fn test_output_after_controller_eof() {
    let output = pipesig()
        .args(["sh", "-c", "sleep 0.2; echo late; echo later"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.stdout, b"late\nlater\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_byte_fidelity_through_cat() {
    let input: Vec<u8> = (0..48 * 1024).map(|i| (i % 251) as u8).collect();
    let output = run_with_input(&["cat"], &input);

    assert_eq!(output.stdout.len(), input.len());
    assert_eq!(output.stdout, input);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_small_buffer_preserves_bytes() {
    let input = b"the quick brown fox jumps over the lazy dog\n".repeat(20);
    let output = run_with_input(&["--buffer-size", "3", "cat"], &input);

    assert_eq!(output.stdout, input);
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_controller_input_from_file() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"alpha\nbeta\n").unwrap();
    std::io::Seek::rewind(&mut file).unwrap();

    let output = pipesig()
        .arg("cat")
        .stdin(Stdio::from(file))
        .output()
        .unwrap();

    assert_eq!(output.stdout, b"alpha\nbeta\n");
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_cat_exit_status_survives_repeated_runs() {
    // cat closes its stdout just before exiting; the status must be its own
    let mut failures = Vec::new();
    for _ in 0..30 {
        let output = run_with_input(&["cat"], b"alpha\nbeta\n");
        assert_eq!(output.stdout, b"alpha\nbeta\n");
        if output.status.code() != Some(0) {
            failures.push(output.status.code());
        }
    }
    assert!(failures.is_empty(), "non-zero statuses: {failures:?}");
}

#[test]
fn test_downstream_close_stops_child() {
    let mut child = pipesig()
        .args(["--term-grace-ms", "2000", "yes"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();

    // Keep the controller connected so only the downstream close can end it
    let _stdin = child.stdin.take().unwrap();
    let mut stdout = child.stdout.take().unwrap();

    let mut buf = [0u8; 4096];
    stdout.read_exact(&mut buf).unwrap();
    assert!(buf.starts_with(b"y\n"));
    drop(stdout);

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    let status = status.expect("pipesig did not exit after downstream closed");
    // `yes` dies from our SIGTERM, or from SIGPIPE once its channel closes
    assert!(
        matches!(status.code(), Some(143) | Some(141)),
        "unexpected status {status:?}"
    );
}

#[test]
fn test_missing_program_fails() {
    let output = pipesig()
        .arg("pipesig-test-no-such-program")
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(255));
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_logs_never_reach_stdout() {
    let output = pipesig()
        .args(["--log-level", "trace", "sh", "-c", "echo hi"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.stdout, b"hi\n");
    assert!(!output.stderr.is_empty());
    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn test_child_stderr_is_not_proxied() {
    let output = pipesig()
        .args(["sh", "-c", "echo out; echo err >&2"])
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.stdout, b"out\n");
    assert_eq!(output.stderr, b"err\n");
    assert_eq!(output.status.code(), Some(0));
}
