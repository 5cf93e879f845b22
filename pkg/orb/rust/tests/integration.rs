// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

mod helpers;

use helpers::{DEFAULT_TIMEOUT, OrbHandle, wait_until, write_config};
use nix::sys::signal::Signal;
use std::time::Duration;

// ===========================================================================
// Group 1: Pass-through and exit codes
// ===========================================================================

#[test]
fn test_output_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}\n");

    let mut orb = OrbHandle::start(
        dir.path(),
        &config,
        &["sh", "-c", "echo hello; echo world; echo oops >&2"],
    );
    let status = orb.wait();
    assert_eq!(status.code(), Some(0));
    assert_eq!(orb.stdout(), vec!["hello", "world"]);
    assert_eq!(orb.count_log_matches("oops"), 1, "stderr is echoed to stderr");
}

#[test]
fn test_exit_code_is_propagated() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}\n");

    let mut orb = OrbHandle::start(dir.path(), &config, &["sh", "-c", "echo bye; exit 7"]);
    assert_eq!(orb.wait().code(), Some(7));
    assert_eq!(orb.count_stdout("bye"), 1);
}

#[test]
fn test_spawn_failure_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}\n");

    let mut orb = OrbHandle::start(dir.path(), &config, &["/nonexistent/orb-test-binary"]);
    assert_eq!(orb.wait().code(), Some(1));
}

// ===========================================================================
// Group 2: Output actions
// ===========================================================================

#[test]
fn test_suppressed_lines_are_not_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
channels:
  - name: quiet
    type: suppress
signals:
  - name: secrets
    regex: "password="
    channel: quiet
"#,
    );

    let mut orb = OrbHandle::start(
        dir.path(),
        &config,
        &["sh", "-c", "echo before; echo password=hunter2; echo after"],
    );
    assert_eq!(orb.wait().code(), Some(0));
    assert_eq!(orb.stdout(), vec!["before", "after"]);
}

#[test]
fn test_exec_action_sees_captures() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("exec.out");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
channels:
  - name: record
    type: exec
    shell: 'echo "$ORB_MATCH_COUNT $ORB_MATCH_1" >> {}'
signals:
  - name: disk
    regex: "disk (\\w+)"
    channel: record
"#,
            out.display()
        ),
    );

    let mut orb = OrbHandle::start(
        dir.path(),
        &config,
        &["sh", "-c", "echo disk full; sleep 1"],
    );
    assert_eq!(orb.wait().code(), Some(0));
    assert!(
        wait_until(DEFAULT_TIMEOUT, || out.exists()),
        "exec action should have written its file"
    );
    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written.trim(), "2 full");
    assert_eq!(orb.count_stdout("disk full"), 1, "matched lines still pass through");
}

// ===========================================================================
// Group 3: Restart and kill
// ===========================================================================

#[test]
fn test_restart_relaunches_child_once() {
    let dir = tempfile::tempdir().unwrap();
    let mark = dir.path().join("launched");
    let config = write_config(
        dir.path(),
        r#"
channels:
  - name: bounce
    type: restart
signals:
  - name: crash
    regex: "boom"
    channel: bounce
"#,
    );
    let script = format!(
        "if [ -f {m} ]; then echo second; exit 7; else touch {m}; echo boom; exec sleep 30; fi",
        m = mark.display()
    );

    let mut orb = OrbHandle::start(dir.path(), &config, &["sh", "-c", script.as_str()]);
    assert_eq!(orb.wait().code(), Some(7));
    assert_eq!(orb.count_stdout("boom"), 1);
    assert_eq!(orb.count_stdout("second"), 1);
    assert!(orb.count_log_matches("restart requested") >= 1);
}

#[test]
fn test_kill_ends_supervision() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
channels:
  - name: stop
    type: kill
signals:
  - name: fatal
    regex: "^FATAL"
    channel: stop
"#,
    );

    let mut orb = OrbHandle::start(
        dir.path(),
        &config,
        &["sh", "-c", "echo FATAL corrupted; exec sleep 30"],
    );
    // SIGTERM -> 128 + 15
    assert_eq!(orb.wait().code(), Some(143));
    assert_eq!(orb.count_stdout("FATAL"), 1);
}

#[test]
fn test_signals_are_forwarded_to_child() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}\n");

    let mut orb = OrbHandle::start(
        dir.path(),
        &config,
        &[
            "sh",
            "-c",
            "trap 'echo got-term; exit 5' TERM; echo ready; while true; do sleep 0.1; done",
        ],
    );
    assert!(orb.wait_for_stdout("ready", DEFAULT_TIMEOUT));
    orb.send_signal(Signal::SIGTERM);
    assert_eq!(orb.wait().code(), Some(5));
    assert_eq!(orb.count_stdout("got-term"), 1);
}

// ===========================================================================
// Group 4: Schedules and checks
// ===========================================================================

#[test]
fn test_interval_schedule_fires_while_running() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("ticks");
    let config = write_config(
        dir.path(),
        &format!(
            r#"
channels:
  - name: tick
    type: exec
    shell: 'echo "$ORB_MATCH_0" >> {}'
signals:
  - name: heartbeat
    channel: tick
    schedule:
      every: 200ms
"#,
            out.display()
        ),
    );

    let mut orb = OrbHandle::start(dir.path(), &config, &["sleep", "2"]);
    assert_eq!(orb.wait().code(), Some(0));
    let written = std::fs::read_to_string(&out).unwrap_or_default();
    assert!(
        written.lines().count() >= 2,
        "expected several ticks, got {written:?}"
    );
    assert!(written.contains("schedule 'heartbeat' tick"));
}

#[test]
fn test_failing_tcp_check_triggers_action() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("check.out");
    let port = {
        // bind and release to find a closed port
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = write_config(
        dir.path(),
        &format!(
            r#"
channels:
  - name: report
    type: exec
    shell: 'echo "$ORB_MATCH_0" >> {}'
checks:
  - name: db
    type: tcp
    host: 127.0.0.1
    port: {port}
    interval: 200ms
    timeout: 500ms
    channel: report
"#,
            out.display()
        ),
    );

    let mut orb = OrbHandle::start(dir.path(), &config, &["sleep", "2"]);
    assert_eq!(orb.wait().code(), Some(0));
    let written = std::fs::read_to_string(&out).unwrap_or_default();
    assert!(
        written.contains("Check 'db' failed"),
        "expected a failure report, got {written:?}"
    );
}

// ===========================================================================
// Group 5: Startup errors and environment
// ===========================================================================

#[test]
fn test_invalid_config_exits_without_spawning() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned");
    let config = write_config(
        dir.path(),
        r#"
channels:
  - name: alert
    type: notify
    url: "http://127.0.0.1:1/hook"
signals:
  - name: errors
    regex: "ERROR"
    channel: pager
"#,
    );

    let touch = format!("touch {}", marker.display());
    let mut orb = OrbHandle::start(dir.path(), &config, &["sh", "-c", touch.as_str()]);
    assert_eq!(orb.wait().code(), Some(1));
    assert!(orb.count_log_matches("pager") >= 1, "error should name the channel");
    assert!(!marker.exists(), "child must not be spawned");
}

#[test]
fn test_missing_config_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.yaml");

    let mut orb = OrbHandle::start(dir.path(), &missing, &["true"]);
    assert_eq!(orb.wait().code(), Some(1));
}

#[test]
fn test_missing_command_is_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}\n");

    let mut orb = OrbHandle::start(dir.path(), &config, &[]);
    let status = orb.wait_with_timeout(Duration::from_secs(5));
    assert_eq!(status.code(), Some(2));
}

#[test]
fn test_env_file_reaches_child() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "{}\n");
    let env_file = dir.path().join("extra.env");
    std::fs::write(&env_file, "# comment\nexport ORB_IT_GREETING=\"hi there\"\n").unwrap();

    let config_arg = config.to_string_lossy().into_owned();
    let env_arg = env_file.to_string_lossy().into_owned();
    let mut orb = OrbHandle::start_with_args(
        dir.path(),
        &["-c", config_arg.as_str(), "--env", env_arg.as_str()],
        &["sh", "-c", "echo \"greeting=$ORB_IT_GREETING\""],
    );
    assert_eq!(orb.wait().code(), Some(0));
    assert_eq!(orb.stdout(), vec!["greeting=hi there"]);
}
