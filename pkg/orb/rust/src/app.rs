// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::checks::CheckScheduler;
use crate::config::Config;
use crate::env::Environment;
use crate::exporter::{self, PrometheusRecorder};
use crate::handlers::Dispatcher;
use crate::monitor::OutputMonitor;
use crate::notify::WebhookNotifier;
use crate::pool::{DEFAULT_QUEUE_SIZE, WorkerPool};
use crate::probe::StandardProbe;
use crate::publish::connect_publishers;
use crate::schedule::ScheduleRunner;
use crate::state::{RestartHistory, SupervisionState};
use crate::supervisor::Supervisor;
use crate::telemetry;

#[derive(Debug, Clone)]
pub struct Options {
    pub workers: usize,
    pub queue_size: usize,
    pub metrics_addr: Option<SocketAddr>,
    pub command: Vec<String>,
}

impl Options {
    pub fn new(workers: usize, command: Vec<String>) -> Self {
        Self {
            workers,
            queue_size: DEFAULT_QUEUE_SIZE,
            metrics_addr: None,
            command,
        }
    }
}

/// Wire every component, supervise the command, and tear everything down.
/// Returns the exit code to propagate.
pub async fn run(options: Options, config: Config, env: Environment) -> Result<i32> {
    let Config {
        sinks,
        patterns,
        schedules,
        checks,
    } = config;
    let sinks = Arc::new(sinks);
    let env = Arc::new(env);
    let supervision = Arc::new(SupervisionState::new());
    let history = Arc::new(RestartHistory::new());

    let publishers = connect_publishers(&sinks)?;
    let notifier = Arc::new(WebhookNotifier::new().context("building notification client")?);
    let probe = Arc::new(StandardProbe::new(history.clone()).context("building probe client")?);

    let exporter_cancel = CancellationToken::new();
    let exporter = match options.metrics_addr {
        Some(addr) => {
            let recorder = PrometheusRecorder::new();
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|_| anyhow!("a metrics recorder is already installed"))?;
            telemetry::describe();
            let listener = exporter::bind(addr)
                .await
                .with_context(|| format!("binding metrics endpoint {addr}"))?;
            Some(tokio::spawn(exporter::serve(
                listener,
                handle,
                exporter_cancel.clone(),
            )))
        }
        None => None,
    };

    let dispatcher = Arc::new(Dispatcher::new(
        sinks.clone(),
        notifier,
        publishers,
        supervision.clone(),
        history,
        env.clone(),
    ));
    let pool = Arc::new(WorkerPool::new(
        options.workers,
        options.queue_size,
        &sinks,
        dispatcher,
    ));
    pool.start();

    let check_scheduler = CheckScheduler::new(
        checks,
        sinks.clone(),
        pool.clone(),
        probe,
        supervision.clone(),
    );
    check_scheduler.start();
    let schedule_runner = ScheduleRunner::new(schedules, pool.clone(), supervision.clone());
    schedule_runner.start();

    let monitor = Arc::new(OutputMonitor::new(patterns, sinks.clone(), pool.clone()));
    let result = match Supervisor::new(&options.command, &env, monitor, supervision) {
        Ok(supervisor) => supervisor.run().await,
        Err(e) => Err(e),
    };

    check_scheduler.stop().await;
    schedule_runner.stop().await;
    pool.stop().await;
    stop_exporter(&exporter_cancel, exporter).await;

    let code = result?;
    info!("exiting with code {code}");
    Ok(code)
}

async fn stop_exporter(cancel: &CancellationToken, exporter: Option<JoinHandle<()>>) {
    cancel.cancel();
    if let Some(handle) = exporter
        && let Err(e) = handle.await
    {
        warn!("metrics exporter task failed: {e}");
    }
}
