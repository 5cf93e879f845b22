// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Output monitor
//! Matches each line of a child stream against the configured patterns and
//! echoes it unless a suppress sink claimed it

use std::fmt;
use std::sync::Arc;

use metrics::counter;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::action::ActionRecord;
use crate::pool::WorkerPool;
use crate::sink::{SinkKind, SinkMap};
use crate::telemetry;

const READ_BUFFER: usize = 64 * 1024;

/// A compiled pattern bound to a sink.
#[derive(Debug, Clone)]
pub struct PatternTrigger {
    pub name: String,
    pub pattern: Regex,
    pub sink: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one line.
#[derive(Debug, Default)]
pub struct LineMatch {
    pub records: Vec<ActionRecord>,
    pub suppress: bool,
}

pub struct OutputMonitor {
    triggers: Arc<[PatternTrigger]>,
    sinks: Arc<SinkMap>,
    pool: Arc<WorkerPool>,
}

impl OutputMonitor {
    pub fn new(triggers: Vec<PatternTrigger>, sinks: Arc<SinkMap>, pool: Arc<WorkerPool>) -> Self {
        Self {
            triggers: triggers.into(),
            sinks,
            pool,
        }
    }

    /// Evaluate every trigger against `line`, in configuration order.
    pub fn evaluate(&self, pid: u32, line: &str) -> LineMatch {
        evaluate(&self.triggers, &self.sinks, pid, line)
    }

    /// Consume `source` until EOF, dispatching matches and echoing
    /// unsuppressed lines to `echo`.
    pub async fn monitor_output<R, W>(
        &self,
        pid: u32,
        stream: Stream,
        source: R,
        mut echo: W,
    ) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = BufReader::with_capacity(READ_BUFFER, source);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let raw = trim_newline(&buf);
            let line = String::from_utf8_lossy(raw);
            counter!(telemetry::EVENTS_TOTAL, "stream" => stream.as_str()).increment(1);

            let matched = self.evaluate(pid, &line);
            for record in matched.records {
                let sink = record.sink.clone();
                if let Err(reason) = self.pool.enqueue(record) {
                    warn!(%stream, sink = %sink, %reason, "failed to enqueue action");
                }
            }
            if matched.suppress {
                continue;
            }
            // the child's bytes go through untouched, only matching is lossy
            echo.write_all(raw).await?;
            echo.write_all(b"\n").await?;
            echo.flush().await?;
        }
        debug!(%stream, "stream closed");
        Ok(())
    }
}

fn trim_newline(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

fn evaluate(triggers: &[PatternTrigger], sinks: &SinkMap, pid: u32, line: &str) -> LineMatch {
    let mut result = LineMatch::default();
    for trigger in triggers {
        let Some(caps) = trigger.pattern.captures(line) else {
            continue;
        };
        let Some(sink) = sinks.get(&trigger.sink) else {
            warn!(signal = %trigger.name, sink = %trigger.sink, "unknown channel");
            continue;
        };
        counter!(
            telemetry::SIGNALS_MATCHED_TOTAL,
            "signal" => trigger.name.clone(),
            "channel" => trigger.sink.clone()
        )
        .increment(1);
        if matches!(sink.kind, SinkKind::Suppress) {
            result.suppress = true;
        }
        let groups = caps
            .iter()
            .skip(1)
            .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect();
        result
            .records
            .push(ActionRecord::for_line(&trigger.sink, pid, line, groups));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::handlers::Dispatcher;
    use crate::handlers::tests::{RecordingNotifier, sink, sink_map};
    use crate::sink::Sink;
    use crate::state::{RestartHistory, SupervisionState};
    use std::collections::HashMap;

    fn trigger(name: &str, pattern: &str, sink: &str) -> PatternTrigger {
        PatternTrigger {
            name: name.to_string(),
            pattern: Regex::new(pattern).unwrap(),
            sink: sink.to_string(),
        }
    }

    fn alert() -> Sink {
        sink(
            "alert",
            SinkKind::Notify {
                url: "https://hooks.example.com".into(),
                template: "{{index .Matches 1}}".into(),
            },
        )
    }

    fn monitor(
        triggers: Vec<PatternTrigger>,
        sinks: Vec<Sink>,
    ) -> (OutputMonitor, Arc<WorkerPool>, Arc<RecordingNotifier>) {
        let sinks = sink_map(sinks);
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(
            sinks.clone(),
            notifier.clone(),
            HashMap::new(),
            Arc::new(SupervisionState::new()),
            Arc::new(RestartHistory::new()),
            Arc::new(Environment::default()),
        );
        let pool = Arc::new(WorkerPool::new(2, 100, &sinks, Arc::new(dispatcher)));
        (
            OutputMonitor::new(triggers, sinks, pool.clone()),
            pool,
            notifier,
        )
    }

    #[test]
    fn test_captures_start_with_full_line() {
        let (m, _, _) = monitor(vec![trigger("errors", "ERROR: (.+)", "alert")], vec![alert()]);
        let result = m.evaluate(9, "ERROR: disk full");
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].captures, vec!["ERROR: disk full", "disk full"]);
        assert_eq!(result.records[0].pid, 9);
        assert!(!result.suppress);
    }

    #[test]
    fn test_every_matching_trigger_produces_a_record() {
        let (m, _, _) = monitor(
            vec![
                trigger("a", "disk", "alert"),
                trigger("b", "full$", "alert"),
                trigger("c", "nomatch", "alert"),
            ],
            vec![alert()],
        );
        assert_eq!(m.evaluate(1, "disk full").records.len(), 2);
        assert!(m.evaluate(1, "all good").records.is_empty());
    }

    #[test]
    fn test_unmatched_optional_group_is_empty() {
        let (m, _, _) = monitor(vec![trigger("opt", "a(b)?(c)", "alert")], vec![alert()]);
        let rec = &m.evaluate(1, "ac").records[0];
        assert_eq!(rec.captures, vec!["ac", "", "c"]);
    }

    #[test]
    fn test_unknown_sink_skipped() {
        let (m, _, _) = monitor(vec![trigger("lost", ".", "nowhere")], vec![alert()]);
        assert!(m.evaluate(1, "x").records.is_empty());
    }

    #[tokio::test]
    async fn test_suppressed_lines_are_not_echoed() {
        let (m, _, _) = monitor(
            vec![
                trigger("noise", "^DEBUG", "hide"),
                trigger("errors", "ERROR: (.+)", "alert"),
            ],
            vec![alert(), sink("hide", SinkKind::Suppress)],
        );
        let input = b"hello\nDEBUG chatter\nDEBUG ERROR: both\r\nbye" as &[u8];
        let mut out = Vec::new();
        m.monitor_output(1, Stream::Stdout, input, &mut out)
            .await
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\nbye\n");
    }

    #[tokio::test]
    async fn test_suppressed_line_still_dispatches_other_matches() {
        let (m, pool, notifier) = monitor(
            vec![
                trigger("noise", "^DEBUG", "hide"),
                trigger("errors", "ERROR: (.+)", "alert"),
            ],
            vec![alert(), sink("hide", SinkKind::Suppress)],
        );
        pool.start();
        let mut out = Vec::new();
        m.monitor_output(1, Stream::Stderr, b"DEBUG ERROR: both\n" as &[u8], &mut out)
            .await
            .unwrap();
        pool.stop().await;
        assert!(out.is_empty());
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "both");
    }

    #[tokio::test]
    async fn test_end_to_end_single_notify() {
        let (m, pool, notifier) =
            monitor(vec![trigger("errors", "ERROR: (.+)", "alert")], vec![alert()]);
        pool.start();
        let mut out = Vec::new();
        m.monitor_output(5, Stream::Stdout, b"ERROR: disk full\n" as &[u8], &mut out)
            .await
            .unwrap();
        pool.stop().await;
        assert_eq!(out, b"ERROR: disk full\n");
        assert_eq!(
            *notifier.sent.lock().unwrap(),
            vec![(
                "https://hooks.example.com".to_string(),
                "disk full".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_non_utf8_bytes_pass_through_unchanged() {
        let (m, _, _) = monitor(vec![trigger("cafe", "caf. (\\w+)", "alert")], vec![alert()]);
        let input = b"caf\xe9 latin1\n" as &[u8];
        let mut out = Vec::new();
        m.monitor_output(1, Stream::Stdout, input, &mut out)
            .await
            .unwrap();
        assert_eq!(out, b"caf\xe9 latin1\n");

        let rec = &m.evaluate(1, &String::from_utf8_lossy(b"caf\xe9 latin1")).records[0];
        assert_eq!(rec.captures[1], "latin1");
    }

    #[tokio::test]
    async fn test_long_line_is_not_truncated() {
        let (m, _, _) = monitor(vec![], vec![]);
        let long = "x".repeat(3 * 1024 * 1024);
        let input = format!("{long}\n");
        let mut out = Vec::new();
        m.monitor_output(1, Stream::Stdout, input.as_bytes(), &mut out)
            .await
            .unwrap();
        assert_eq!(out.len(), long.len() + 1);
    }
}
