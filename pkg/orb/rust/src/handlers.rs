// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Sink handlers
//! One handler per sink kind; failures are terminal for that action only

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::action::ActionRecord;
use crate::env::Environment;
use crate::errors::ActionError;
use crate::ports::{Notifier, Publisher};
use crate::sink::{Sink, SinkKind, SinkMap};
use crate::state::{RestartHistory, SupervisionState};
use crate::telemetry;
use crate::template::{self, TemplateData};

/// What became of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Dropped,
}

/// Log-and-drop: a handler error is logged as a warning and the record is
/// discarded. Nothing is retried or escalated.
pub fn settle(sink: &Sink, result: Result<(), ActionError>) -> Outcome {
    let kind = sink.kind.type_name();
    match result {
        Ok(()) => {
            counter!(telemetry::ACTIONS_TOTAL, "channel" => sink.name.clone(), "type" => kind, "outcome" => "ok")
                .increment(1);
            Outcome::Delivered
        }
        Err(e) => {
            counter!(telemetry::ACTIONS_TOTAL, "channel" => sink.name.clone(), "type" => kind, "outcome" => "error")
                .increment(1);
            warn!(sink = %sink.name, kind, "action failed: {e}");
            Outcome::Dropped
        }
    }
}

/// Environment added to exec sink commands on top of the inherited one.
pub fn exec_environment(record: &ActionRecord) -> Vec<(String, String)> {
    let mut vars = Vec::with_capacity(record.captures.len() + 2);
    vars.push(("ORB_PID".to_string(), record.pid.to_string()));
    vars.push((
        "ORB_MATCH_COUNT".to_string(),
        record.captures.len().to_string(),
    ));
    for (i, capture) in record.captures.iter().enumerate() {
        vars.push((format!("ORB_MATCH_{i}"), capture.clone()));
    }
    vars
}

/// Executes action records against their sinks. Shared by all workers.
pub struct Dispatcher {
    sinks: Arc<SinkMap>,
    notifier: Arc<dyn Notifier>,
    publishers: HashMap<String, Arc<dyn Publisher>>,
    supervision: Arc<SupervisionState>,
    history: Arc<RestartHistory>,
    env: Arc<Environment>,
}

impl Dispatcher {
    pub fn new(
        sinks: Arc<SinkMap>,
        notifier: Arc<dyn Notifier>,
        publishers: HashMap<String, Arc<dyn Publisher>>,
        supervision: Arc<SupervisionState>,
        history: Arc<RestartHistory>,
        env: Arc<Environment>,
    ) -> Self {
        Self {
            sinks,
            notifier,
            publishers,
            supervision,
            history,
            env,
        }
    }

    pub async fn dispatch(&self, record: ActionRecord) -> Outcome {
        let Some(sink) = self.sinks.get(&record.sink) else {
            warn!(sink = %record.sink, "dropping action for unknown channel");
            return Outcome::Dropped;
        };
        let started = Instant::now();
        let result = self.execute(sink, &record).await;
        histogram!(
            telemetry::ACTION_LATENCY_SECONDS,
            "channel" => sink.name.clone(),
            "type" => sink.kind.type_name()
        )
        .record(started.elapsed().as_secs_f64());
        settle(sink, result)
    }

    async fn execute(&self, sink: &Sink, record: &ActionRecord) -> Result<(), ActionError> {
        match &sink.kind {
            SinkKind::Notify { url, template } => self.notify(url, template, record).await,
            SinkKind::Publish(target) => {
                let publisher = self
                    .publishers
                    .get(&sink.name)
                    .ok_or_else(|| ActionError::NoPublisher(sink.name.clone()))?;
                publisher
                    .publish(&target.topic, record.line.as_bytes())
                    .await
            }
            SinkKind::Exec { shell } => self.exec(shell, record).await,
            SinkKind::Restart => {
                if let Some(pid) = self.supervision.request_restart() {
                    self.history.record();
                    counter!(telemetry::RESTARTS_TOTAL).increment(1);
                    info!(sink = %sink.name, pid, "restart requested");
                } else {
                    info!(sink = %sink.name, "restart requested with no running child");
                }
                Ok(())
            }
            SinkKind::Kill => {
                let pid = self.supervision.request_kill();
                info!(sink = %sink.name, pid, "kill requested");
                Ok(())
            }
            SinkKind::Suppress => Ok(()),
        }
    }

    async fn notify(
        &self,
        url: &str,
        template: &str,
        record: &ActionRecord,
    ) -> Result<(), ActionError> {
        let data = TemplateData {
            pid: record.pid,
            logline: &record.line,
            timestamp: &record.timestamp,
            matches: &record.captures,
            env: self.env.vars(),
        };
        let destination = template::render(url, &data)?;
        let message = if template.is_empty() {
            record.line.clone()
        } else {
            template::render(template, &data)?
        };
        self.notifier.send(&destination, &message).await
    }

    async fn exec(&self, shell: &str, record: &ActionRecord) -> Result<(), ActionError> {
        let output = Command::new("bash")
            .arg("-c")
            .arg(shell)
            .envs(self.env.overlay().iter().cloned())
            .envs(exec_environment(record))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        debug!(
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "exec finished with {}",
            output.status
        );
        if output.status.success() {
            Ok(())
        } else {
            Err(ActionError::ExecStatus(output.status))
        }
    }
}
