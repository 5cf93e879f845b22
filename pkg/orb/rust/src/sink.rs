// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Read-only name to sink lookup, built once at load.
pub type SinkMap = HashMap<String, Sink>;

/// A named destination for dispatched actions ("channel" in config files).
#[derive(Debug, Clone)]
pub struct Sink {
    pub name: String,
    pub kind: SinkKind,
    pub rate_limit: Option<RateLimit>,
}

#[derive(Debug, Clone)]
pub enum SinkKind {
    /// `url` and `template` are both rendered per action; an empty template
    /// sends the triggering line as-is.
    Notify { url: String, template: String },
    Publish(PublishTarget),
    Exec { shell: String },
    Restart,
    Kill,
    Suppress,
}

impl SinkKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            SinkKind::Notify { .. } => "notify",
            SinkKind::Publish(_) => "publish",
            SinkKind::Exec { .. } => "exec",
            SinkKind::Restart => "restart",
            SinkKind::Kill => "kill",
            SinkKind::Suppress => "suppress",
        }
    }

    /// Sinks that deliver something outward. Check failures only go to these.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            SinkKind::Notify { .. } | SinkKind::Publish(_) | SinkKind::Exec { .. }
        )
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishTarget {
    pub broker: String,
    pub topic: String,
    pub tls: bool,
    pub insecure_skip_verify: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub sasl: Option<SaslCredentials>,
}

#[derive(Clone, Default)]
pub struct SaslCredentials {
    pub mechanism: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub per_sec: f64,
    pub burst: u32,
}
