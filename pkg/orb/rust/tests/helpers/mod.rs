// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

#![allow(dead_code)]

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Handle to a running `orb` supervisor. Stdout carries the child's echoed
/// output, stderr carries orb's own log.
pub struct OrbHandle {
    child: Child,
    stdout_lines: Arc<Mutex<Vec<String>>>,
    log_lines: Arc<Mutex<Vec<String>>>,
    _stdout_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

fn collect<R: Read + Send + 'static>(
    source: R,
    tag: &'static str,
    sink: Arc<Mutex<Vec<String>>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        for line in BufReader::new(source).lines() {
            match line {
                Ok(l) => {
                    eprintln!("[{tag}] {l}");
                    sink.lock().unwrap().push(l);
                }
                Err(_) => break,
            }
        }
    })
}

impl OrbHandle {
    /// Start `orb -c <config> --skip-dotenv -- <command...>` inside `dir`.
    pub fn start(dir: &Path, config: &Path, command: &[&str]) -> Self {
        let config = config.to_string_lossy().into_owned();
        Self::start_with_args(dir, &["-c", config.as_str(), "--skip-dotenv"], command)
    }

    pub fn start_with_args(dir: &Path, args: &[&str], command: &[&str]) -> Self {
        let bin = env!("CARGO_BIN_EXE_orb");
        let mut child = Command::new(bin)
            .current_dir(dir)
            .env("RUST_LOG", "info")
            .args(args)
            .arg("--")
            .args(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start orb");

        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let stdout_lines = Arc::new(Mutex::new(Vec::new()));
        let log_lines = Arc::new(Mutex::new(Vec::new()));
        let stdout_thread = collect(stdout, "orb:out", Arc::clone(&stdout_lines));
        let stderr_thread = collect(stderr, "orb:log", Arc::clone(&log_lines));

        Self {
            child,
            stdout_lines,
            log_lines,
            _stdout_thread: stdout_thread,
            _stderr_thread: stderr_thread,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Lines the supervised command wrote to stdout and orb passed through.
    pub fn stdout(&self) -> Vec<String> {
        self.stdout_lines.lock().unwrap().clone()
    }

    pub fn count_stdout(&self, pattern: &str) -> usize {
        self.stdout_lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.contains(pattern))
            .count()
    }

    pub fn count_log_matches(&self, pattern: &str) -> usize {
        self.log_lines
            .lock()
            .unwrap()
            .iter()
            .filter(|l| l.contains(pattern))
            .count()
    }

    /// Wait until a log line containing `pattern` appears, or timeout.
    pub fn wait_for_log(&self, pattern: &str, timeout: Duration) -> bool {
        wait_until(timeout, || self.count_log_matches(pattern) > 0)
    }

    /// Wait until a stdout line containing `pattern` appears, or timeout.
    pub fn wait_for_stdout(&self, pattern: &str, timeout: Duration) -> bool {
        wait_until(timeout, || self.count_stdout(pattern) > 0)
    }

    pub fn send_signal(&self, sig: Signal) {
        signal::kill(Pid::from_raw(self.child.id() as i32), sig)
            .expect("failed to send signal to orb");
    }

    /// Wait for orb to exit within the given timeout. Kills it on timeout.
    pub fn wait_with_timeout(&mut self, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait().expect("failed to check orb status") {
                Some(status) => {
                    // let the reader threads drain what is left in the pipes
                    std::thread::sleep(Duration::from_millis(100));
                    return status;
                }
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed orb");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    pub fn wait(&mut self) -> ExitStatus {
        self.wait_with_timeout(DEFAULT_TIMEOUT)
    }
}

impl Drop for OrbHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Write `green-orb.yaml` into `dir` and return its path.
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("green-orb.yaml");
    std::fs::write(&path, yaml)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
    path
}
