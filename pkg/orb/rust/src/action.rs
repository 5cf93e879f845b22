// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use chrono::{Local, SecondsFormat};

/// One unit of work flowing from a producer into the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub sink: String,
    pub timestamp: String,
    pub pid: u32,
    pub line: String,
    /// Element 0 is always the full line (or the synthetic message).
    pub captures: Vec<String>,
}

impl ActionRecord {
    /// Record for a matched output line. `groups` are the regex groups after
    /// the whole-match group.
    pub fn for_line(sink: &str, pid: u32, line: &str, groups: Vec<String>) -> Self {
        let mut captures = Vec::with_capacity(groups.len() + 1);
        captures.push(line.to_string());
        captures.extend(groups);
        Self {
            sink: sink.to_string(),
            timestamp: now_rfc3339(),
            pid,
            line: line.to_string(),
            captures,
        }
    }

    /// Record for a check failure or schedule tick.
    pub fn synthetic(sink: &str, pid: u32, message: String) -> Self {
        Self {
            sink: sink.to_string(),
            timestamp: now_rfc3339(),
            pid,
            captures: vec![message.clone()],
            line: message,
        }
    }
}

pub fn now_rfc3339() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
