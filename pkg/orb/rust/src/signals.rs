// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::SupervisorError;
use crate::state::SupervisionState;

/// Signals relayed to the supervised child.
pub const FORWARDED_SIGNALS: [Signal; 12] = [
    Signal::SIGHUP,
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTERM,
    Signal::SIGUSR1,
    Signal::SIGUSR2,
    Signal::SIGWINCH,
    Signal::SIGALRM,
    Signal::SIGCONT,
    Signal::SIGTSTP,
    Signal::SIGTTIN,
    Signal::SIGTTOU,
];

/// SIGCHLD is the runtime's own bookkeeping and is never relayed.
pub fn should_forward(sig: Signal) -> bool {
    sig != Signal::SIGCHLD
}

/// Relays received signals to whichever child is current in the
/// supervision state.
pub struct SignalForwarder {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SignalForwarder {
    pub fn start(state: Arc<SupervisionState>) -> Result<Self, SupervisorError> {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();
        for sig in FORWARDED_SIGNALS.into_iter().filter(|s| should_forward(*s)) {
            let mut stream =
                signal(SignalKind::from_raw(sig as i32)).map_err(SupervisorError::Signals)?;
            let cancel = cancel.clone();
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        received = stream.recv() => {
                            if received.is_none() {
                                break;
                            }
                            match state.forward(sig) {
                                Some(pid) => info!(pid, "forwarded {sig}"),
                                None => debug!("received {sig} with no running child"),
                            }
                        }
                    }
                }
            }));
        }
        Ok(Self { cancel, tasks })
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("signal forwarder task failed: {e}");
            }
        }
    }
}
