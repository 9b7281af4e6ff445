//! CLI integration tests for the bundled binaries, using assert_cmd.

use std::{os::unix::fs::PermissionsExt, path::PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn toolbelt() -> Command {
    Command::cargo_bin("toolbelt").expect("toolbelt binary should be built")
}

/// A config file that keeps logs off disk, plus `extra` TOML.
fn config(dir: &TempDir, extra: &str) -> PathBuf {
    let path = dir.path().join("toolbelt.toml");
    std::fs::write(&path, format!("[logging]\nto_file = false\n\n{extra}")).unwrap();
    path
}

#[test]
fn test_help_lists_base_options() {
    toolbelt()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Everyday helpers for scripts"))
        .stdout(predicate::str::contains("--log <LEVEL>"))
        .stdout(predicate::str::contains("--email <EMAIL>"));
}

#[test]
fn test_invalid_log_level_is_a_usage_error() {
    toolbelt()
        .args(["--log", "VERBOSE", "name", "x"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_name_and_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, "");

    toolbelt()
        .arg("--config")
        .arg(&cfg)
        .args(["name", "/a/b/c/script.py"])
        .assert()
        .success()
        .stdout("script.py\n");

    toolbelt()
        .arg("--config")
        .arg(&cfg)
        .args(["log-file", "/a/b/c/script.py"])
        .assert()
        .success()
        .stdout("/tmp/script.log\n");
}

#[test]
fn test_run_prints_trimmed_output() {
    let dir = tempfile::tempdir().unwrap();
    toolbelt()
        .arg("--config")
        .arg(config(&dir, ""))
        .args(["run", "echo '  hello ' | tr a-z A-Z"])
        .assert()
        .success()
        .stdout("HELLO\n");
}

#[test]
fn test_run_failure() {
    let dir = tempfile::tempdir().unwrap();
    toolbelt()
        .arg("--config")
        .arg(config(&dir, ""))
        .args(["run", "exit 7"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[ERROR] pipe command \"exit 7\" failed"))
        .stderr(predicate::str::contains("Command failed: exit 7"));
}

#[test]
fn test_check_reachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &format!("[connectivity]\ntcp_port = {port}\n"));

    toolbelt()
        .arg("--config")
        .arg(&cfg)
        .args(["check", "--tcp", "--host", "127.0.0.1", "--attempts", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Connectivity: true"));
}

#[test]
fn test_check_unreachable_tries_each_attempt() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &format!("[connectivity]\ntcp_port = {port}\n"));

    let output = toolbelt()
        .arg("--config")
        .arg(&cfg)
        .args(["--log", "DEBUG"])
        .args(["check", "--tcp", "--host", "127.0.0.1"])
        .args(["--attempts", "2", "--interval", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Connectivity: false"))
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(output).unwrap();
    assert_eq!(stdout.matches("no response from 127.0.0.1").count(), 2);
}

#[test]
fn test_debug_lines_stay_off_stdout_at_info() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir, &format!("[connectivity]\ntcp_port = {port}\n"));

    toolbelt()
        .arg("--config")
        .arg(&cfg)
        .args(["--log", "INFO"])
        .args(["check", "--tcp", "--host", "127.0.0.1"])
        .args(["--attempts", "2", "--interval", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Connectivity: false"))
        .stdout(predicate::str::contains("no response from").not())
        .stdout(predicate::str::contains("[DEBUG]").not());
}

#[test]
fn test_stdout_line_format() {
    let dir = tempfile::tempdir().unwrap();
    toolbelt()
        .arg("--config")
        .arg(config(&dir, ""))
        .args(["run", "exit 7"])
        .assert()
        .failure()
        .stdout(predicate::str::is_match(
            r#"(?m)^\[\d{2}/\d{2}/\d{4} \d{2}:\d{2}:\d{2}\] \[ERROR\] pipe command "exit 7" failed$"#,
        )
        .unwrap());
}

#[test]
fn test_mail_uses_configured_program() {
    let dir = tempfile::tempdir().unwrap();
    let sent = dir.path().join("sent.txt");
    let program = dir.path().join("fake-mail");
    std::fs::write(
        &program,
        format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{sent}'\ncat >> '{sent}'\n",
            sent = sent.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();
    let cfg = config(
        &dir,
        &format!("[mail]\nprogram = \"{}\"\n", program.display()),
    );

    toolbelt()
        .arg("--config")
        .arg(&cfg)
        .args(["-e", "foo@bar.com", "mail", "-s", "python test mail"])
        .write_stdin("mail body text")
        .assert()
        .success()
        .stdout(predicate::str::contains("[INFO] Mail sent to foo@bar.com"));

    assert_eq!(
        std::fs::read_to_string(&sent).unwrap(),
        "-s\npython test mail\nfoo@bar.com\nmail body text\n"
    );
}

#[test]
fn test_mail_needs_a_recipient() {
    let dir = tempfile::tempdir().unwrap();
    toolbelt()
        .arg("--config")
        .arg(config(&dir, ""))
        .args(["mail", "-s", "test"])
        .write_stdin("body")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No recipient"));
}

#[test]
fn test_require_root() {
    let dir = tempfile::tempdir().unwrap();
    let assert = toolbelt()
        .arg("--config")
        .arg(config(&dir, ""))
        .arg("require-root")
        .assert();

    if nix::unistd::geteuid().is_root() {
        assert.success().stdout(predicate::str::contains("running as root"));
    } else {
        assert.code(1).stdout(predicate::str::contains(
            "[CRITICAL] root access is needed to run this script, exiting...",
        ));
    }
}

#[test]
fn test_missing_config_file() {
    toolbelt()
        .args(["--config", "/nonexistent/toolbelt.toml", "name", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not load config"));
}

#[test]
fn test_gps_echo_reports_unreadable_device() {
    Command::cargo_bin("gps-echo")
        .unwrap()
        .args(["--device", "/nonexistent/ttyGPS", "--timeout", "1"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains(
            "ERROR: failed reading gps serial device at: /nonexistent/ttyGPS",
        ));
}

#[test]
fn test_stun_probe_help() {
    Command::cargo_bin("stun-probe")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--server <SERVER>"));
}
