// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Supervision loop
//! spawn -> running -> exited -> (restart requested ? spawn : done)

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use metrics::gauge;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::env::Environment;
use crate::errors::SupervisorError;
use crate::monitor::{OutputMonitor, Stream};
use crate::signals::SignalForwarder;
use crate::state::SupervisionState;
use crate::telemetry;

/// Exit code used when the supervisor itself fails to observe the child.
pub const FAILURE_EXIT_CODE: i32 = 1;

pub struct Supervisor {
    program: String,
    args: Vec<String>,
    env_overlay: Vec<(String, String)>,
    monitor: Arc<OutputMonitor>,
    state: Arc<SupervisionState>,
}

impl Supervisor {
    pub fn new(
        command: &[String],
        env: &Environment,
        monitor: Arc<OutputMonitor>,
        state: Arc<SupervisionState>,
    ) -> Result<Self, SupervisorError> {
        let (program, args) = command.split_first().ok_or(SupervisorError::EmptyCommand)?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            env_overlay: env.overlay().to_vec(),
            monitor,
            state,
        })
    }

    /// Run the child until it exits without a pending restart. Returns the
    /// exit code to propagate.
    pub async fn run(&self) -> Result<i32, SupervisorError> {
        let forwarder = SignalForwarder::start(self.state.clone())?;
        let result = self.supervise().await;
        forwarder.stop().await;
        result
    }

    async fn supervise(&self) -> Result<i32, SupervisorError> {
        let mut launches = 0u64;
        loop {
            let mut child = self.spawn()?;
            launches += 1;
            let pid = child.id().unwrap_or(0);
            self.state.attach(pid);
            gauge!(telemetry::OBSERVED_PID).set(f64::from(pid));
            info!(pid, launch = launches, "started {}", self.program);

            let stdout = child
                .stdout
                .take()
                .map(|out| self.watch(pid, Stream::Stdout, out, tokio::io::stdout()));
            let stderr = child
                .stderr
                .take()
                .map(|err| self.watch(pid, Stream::Stderr, err, tokio::io::stderr()));

            let waited = child.wait().await;
            self.state.detach();
            gauge!(telemetry::OBSERVED_PID).set(0.0);

            for monitor in [stdout, stderr].into_iter().flatten() {
                match monitor.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(pid, "output monitor failed: {e}"),
                    Err(e) => warn!(pid, "output monitor task failed: {e}"),
                }
            }

            let status = match waited {
                Ok(status) => status,
                Err(e) => {
                    error!(pid, "waiting for child failed: {e}");
                    return Ok(FAILURE_EXIT_CODE);
                }
            };
            info!(pid, "child exited with {status}");

            if self.state.take_restart() {
                info!(pid, "restarting {}", self.program);
                continue;
            }
            return Ok(exit_code(status));
        }
    }

    fn spawn(&self) -> Result<Child, SupervisorError> {
        Command::new(&self.program)
            .args(&self.args)
            .envs(self.env_overlay.iter().cloned())
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SupervisorError::Spawn {
                command: self.program.clone(),
                source,
            })
    }

    fn watch<R, W>(
        &self,
        pid: u32,
        stream: Stream,
        source: R,
        echo: W,
    ) -> JoinHandle<std::io::Result<()>>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let monitor = self.monitor.clone();
        tokio::spawn(async move { monitor.monitor_output(pid, stream, source, echo).await })
    }
}

/// The child's exit code, or 128 + signal number when it was killed.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(FAILURE_EXIT_CODE)
}
