// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Error types for configuration, dispatch and supervision

use std::path::PathBuf;

use thiserror::Error;

/// Raised while loading or validating configuration. Every variant is fatal
/// at startup: nothing is spawned once one of these surfaces.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("reading environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("channel missing required 'name' field")]
    MissingChannelName,

    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),

    #[error("invalid channel type '{kind}' for channel '{channel}'")]
    InvalidChannelType { channel: String, kind: String },

    #[error("{kind} channel '{channel}' requires '{field}' field")]
    MissingChannelField {
        channel: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("channel '{0}' has a negative rate_per_sec")]
    NegativeRate(String),

    #[error("signal '{0}' missing required 'channel' field")]
    SignalMissingChannel(String),

    #[error("signal '{signal}' references undefined channel '{channel}'")]
    SignalUnknownChannel { signal: String, channel: String },

    #[error("signal '{0}' must define either 'regex' or 'schedule'")]
    SignalWithoutTrigger(String),

    #[error("scheduled signal must have a 'name'")]
    ScheduleWithoutName,

    #[error("schedule '{0}' must set exactly one of 'every' or 'cron'")]
    AmbiguousSchedule(String),

    #[error("invalid duration '{value}' for '{owner}': {source}")]
    InvalidDuration {
        owner: String,
        value: String,
        source: humantime::DurationError,
    },

    #[error("duration '{value}' for '{owner}' must be positive")]
    ZeroDuration { owner: String, value: String },

    #[error("invalid cron expression '{expr}' for '{owner}': {source}")]
    InvalidCron {
        owner: String,
        expr: String,
        source: cron::error::Error,
    },

    #[error("invalid regex '{pattern}' for '{owner}': {source}")]
    InvalidPattern {
        owner: String,
        pattern: String,
        source: regex::Error,
    },

    #[error("check missing required 'name' field")]
    MissingCheckName,

    #[error("check '{0}' missing required 'channel' field")]
    CheckMissingChannel(String),

    #[error("check '{check}' references undefined channel '{channel}'")]
    CheckUnknownChannel { check: String, channel: String },

    #[error("invalid check type '{kind}' for check '{check}'")]
    InvalidCheckType { check: String, kind: String },

    #[error("{kind} check '{check}' requires '{field}' field")]
    MissingCheckField {
        check: String,
        kind: &'static str,
        field: &'static str,
    },

    #[error("flapping check '{0}' requires a positive 'restart_threshold'")]
    InvalidThreshold(String),

    #[error("publish channel '{channel}': {reason}")]
    Publisher { channel: String, reason: String },
}

/// Raised while parsing or rendering a message template.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed action starting at byte {0}")]
    Unclosed(usize),

    #[error("empty action")]
    EmptyAction,

    #[error("can't evaluate field {0}")]
    UnknownField(String),

    #[error("function \"{0}\" not defined")]
    UnknownFunction(String),

    #[error("unsupported template action '{0}': only field access and index are available")]
    Unsupported(String),

    #[error("malformed action: {0}")]
    Malformed(String),

    #[error("index out of range: {0}")]
    IndexOutOfRange(usize),
}

/// A single sink handler failure. Terminal for that one action only.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("template: {0}")]
    Template(#[from] TemplateError),

    #[error("notify: {0}")]
    Notify(String),

    #[error("publish: {0}")]
    Publish(String),

    #[error("no publisher connected for channel '{0}'")]
    NoPublisher(String),

    #[error("exec: {0}")]
    Exec(#[from] std::io::Error),

    #[error("exec exited with {0}")]
    ExecStatus(std::process::ExitStatus),
}

/// Why a health probe reported failure.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{0}")]
    Request(String),

    #[error("unexpected status code: got {got}, expected {expected}")]
    Status { got: u16, expected: u16 },

    #[error("response body did not match regex")]
    Body,

    #[error("dial {addr}: {reason}")]
    Dial { addr: String, reason: String },

    #[error("dial {0}: timed out")]
    DialTimeout(String),

    #[error("process restarted {count} times in {window} (threshold: {threshold})")]
    Flapping {
        count: usize,
        window: String,
        threshold: u32,
    },
}

/// Raised by the supervision loop itself, as opposed to the child.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("no command given")]
    EmptyCommand,

    #[error("spawning '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("installing signal handler: {0}")]
    Signals(std::io::Error),
}
