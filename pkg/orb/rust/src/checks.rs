// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Check scheduler
//! Runs each health check on its own ticker and turns failures into actions

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use metrics::counter;
use regex::Regex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::action::ActionRecord;
use crate::config::parse_period;
use crate::errors::ConfigError;
use crate::pool::WorkerPool;
use crate::ports::Probe;
use crate::schedule::{Ticker, shutdown_tasks, spawn_periodic};
use crate::sink::SinkMap;
use crate::state::SupervisionState;
use crate::telemetry;

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_TCP_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_FLAP_WINDOW: Duration = Duration::from_secs(5 * 60);

/// A configured health check. Timing strings are kept raw and parsed when
/// the check is armed, so one bad value only disables its own check.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub name: String,
    pub sink: String,
    pub interval: String,
    pub timeout: Option<String>,
    pub kind: CheckKind,
}

#[derive(Debug, Clone)]
pub enum CheckKind {
    Http {
        url: String,
        expect_status: u16,
        body: Option<Regex>,
    },
    Tcp {
        host: String,
        port: u16,
    },
    Flapping {
        threshold: u32,
        window: Option<String>,
    },
}

impl CheckKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            CheckKind::Http { .. } => "http",
            CheckKind::Tcp { .. } => "tcp",
            CheckKind::Flapping { .. } => "flapping",
        }
    }
}

/// A health check with its timing resolved.
#[derive(Debug, Clone)]
pub struct ArmedCheck {
    pub check: HealthCheck,
    pub interval: Duration,
    pub timeout: Duration,
    pub window: Duration,
}

impl ArmedCheck {
    pub fn arm(check: HealthCheck) -> Result<Self, ConfigError> {
        let interval = parse_period(&check.name, &check.interval)?;
        let timeout = match (&check.timeout, &check.kind) {
            (Some(raw), _) => parse_period(&check.name, raw)?,
            (None, CheckKind::Tcp { .. }) => DEFAULT_TCP_TIMEOUT,
            (None, _) => DEFAULT_HTTP_TIMEOUT,
        };
        let window = match &check.kind {
            CheckKind::Flapping {
                window: Some(raw), ..
            } => parse_period(&check.name, raw)?,
            _ => DEFAULT_FLAP_WINDOW,
        };
        Ok(Self {
            check,
            interval,
            timeout,
            window,
        })
    }
}

pub struct CheckScheduler {
    checks: Vec<HealthCheck>,
    sinks: Arc<SinkMap>,
    pool: Arc<WorkerPool>,
    probe: Arc<dyn Probe>,
    supervision: Arc<SupervisionState>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct CheckContext {
    armed: ArmedCheck,
    sinks: Arc<SinkMap>,
    pool: Arc<WorkerPool>,
    probe: Arc<dyn Probe>,
    supervision: Arc<SupervisionState>,
}

impl CheckScheduler {
    pub fn new(
        checks: Vec<HealthCheck>,
        sinks: Arc<SinkMap>,
        pool: Arc<WorkerPool>,
        probe: Arc<dyn Probe>,
        supervision: Arc<SupervisionState>,
    ) -> Self {
        Self {
            checks,
            sinks,
            pool,
            probe,
            supervision,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Arm every check and start its ticker. Returns how many were started.
    pub fn start(&self) -> usize {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for check in &self.checks {
            let armed = match ArmedCheck::arm(check.clone()) {
                Ok(armed) => armed,
                Err(e) => {
                    error!(check = %check.name, "check disabled: {e}");
                    continue;
                }
            };
            info!(
                check = %check.name,
                kind = check.kind.type_name(),
                interval = ?armed.interval,
                "starting health check"
            );
            let ticker = Ticker::every(armed.interval);
            let ctx = Arc::new(CheckContext {
                armed,
                sinks: self.sinks.clone(),
                pool: self.pool.clone(),
                probe: self.probe.clone(),
                supervision: self.supervision.clone(),
            });
            tasks.push(spawn_periodic(ticker, self.cancel.child_token(), move || {
                let ctx = ctx.clone();
                async move { ctx.run_once().await }
            }));
        }
        tasks.len()
    }

    pub async fn stop(&self) {
        shutdown_tasks(&self.cancel, &self.tasks).await;
        debug!("check scheduler stopped");
    }
}

impl CheckContext {
    async fn run_once(&self) {
        let check = &self.armed.check;
        let kind = check.kind.type_name();
        let Err(failure) = self.probe.run(&self.armed).await else {
            counter!(telemetry::CHECKS_TOTAL, "type" => kind, "outcome" => "ok").increment(1);
            debug!(check = %check.name, "check passed");
            return;
        };
        counter!(telemetry::CHECKS_TOTAL, "type" => kind, "outcome" => "fail").increment(1);

        let message = format!("Check '{}' failed: {}", check.name, failure);
        warn!(check = %check.name, "{message}");

        match self.sinks.get(&check.sink) {
            Some(sink) if sink.kind.is_outbound() => {}
            Some(sink) => {
                debug!(check = %check.name, sink = %sink.name, kind = sink.kind.type_name(), "sink does not take check failures");
                return;
            }
            None => {
                warn!(check = %check.name, sink = %check.sink, "unknown channel");
                return;
            }
        }

        let pid = self.supervision.current_process().unwrap_or(0);
        if let Err(reason) = self
            .pool
            .enqueue(ActionRecord::synthetic(&check.sink, pid, message))
        {
            warn!(check = %check.name, %reason, "failed to enqueue check action");
        }
    }
}
