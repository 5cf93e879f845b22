// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::{info, warn};

/// Restart intent and the currently running child, shared between the
/// supervision loop and the restart/kill handlers. Every read and write
/// goes through one lock.
#[derive(Debug, Default)]
pub struct SupervisionState {
    inner: Mutex<Supervision>,
}

#[derive(Debug, Default)]
struct Supervision {
    restart_requested: bool,
    child: Option<u32>,
}

impl SupervisionState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Supervision> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for a relaunch once the current child exits, and terminate it.
    /// Returns the pid that was signalled, if any.
    pub fn request_restart(&self) -> Option<u32> {
        let mut state = self.lock();
        state.restart_requested = true;
        let pid = state.child?;
        deliver(pid, Signal::SIGTERM);
        Some(pid)
    }

    /// Terminate the current child without relaunching it.
    pub fn request_kill(&self) -> Option<u32> {
        let mut state = self.lock();
        state.restart_requested = false;
        let pid = state.child?;
        deliver(pid, Signal::SIGTERM);
        Some(pid)
    }

    pub fn current_process(&self) -> Option<u32> {
        self.lock().child
    }

    /// Relay `sig` to the current child, if there is one.
    pub fn forward(&self, sig: Signal) -> Option<u32> {
        let state = self.lock();
        let pid = state.child?;
        deliver(pid, sig);
        Some(pid)
    }

    pub(crate) fn attach(&self, pid: u32) {
        self.lock().child = Some(pid);
    }

    pub(crate) fn detach(&self) {
        self.lock().child = None;
    }

    /// Read and clear the restart flag.
    pub(crate) fn take_restart(&self) -> bool {
        std::mem::take(&mut self.lock().restart_requested)
    }
}

fn deliver(pid: u32, sig: Signal) {
    let Ok(raw) = i32::try_from(pid) else {
        warn!(pid, "pid out of range, not sending {sig}");
        return;
    };
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => info!(pid, "sent {sig}"),
        Err(e) => warn!(pid, "failed to send {sig}: {e}"),
    }
}

/// Timestamps of restarts performed, consulted by flapping checks. Pruned
/// lazily whenever it is counted.
#[derive(Debug, Default)]
pub struct RestartHistory {
    entries: Mutex<VecDeque<Instant>>,
}

impl RestartHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self) {
        self.record_at(Instant::now());
    }

    pub fn record_at(&self, at: Instant) {
        self.lock().push_back(at);
    }

    pub fn count_recent(&self, window: Duration) -> usize {
        self.count_recent_at(Instant::now(), window)
    }

    /// Drop entries at or before `now - window` and count the rest.
    pub fn count_recent_at(&self, now: Instant, window: Duration) -> usize {
        let mut entries = self.lock();
        if let Some(cutoff) = now.checked_sub(window) {
            entries.retain(|t| *t > cutoff);
        }
        entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
