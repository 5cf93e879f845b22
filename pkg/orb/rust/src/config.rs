// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::checks::{CheckKind, HealthCheck};
use crate::errors::ConfigError;
use crate::monitor::PatternTrigger;
use crate::schedule::{Cadence, TimeTrigger};
use crate::sink::{PublishTarget, RateLimit, SaslCredentials, Sink, SinkKind, SinkMap};
use crate::template::Template;

pub const DEFAULT_CONFIG_FILE: &str = "green-orb.yaml";

/// On-disk layout. Field names follow the YAML keys.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub channels: Vec<ChannelConfig>,
    pub signals: Vec<SignalConfig>,
    pub checks: Vec<CheckConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub template: String,
    pub topic: String,
    pub broker: String,
    pub shell: String,
    pub sasl_mechanism: String,
    pub sasl_username: String,
    pub sasl_password: String,
    pub tls: bool,
    pub tls_insecure_skip_verify: bool,
    pub tls_ca_file: Option<PathBuf>,
    pub tls_cert_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,
    pub rate_per_sec: f64,
    pub burst: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub name: String,
    pub regex: String,
    pub channel: String,
    pub schedule: Option<ScheduleConfig>,
    pub enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub every: String,
    pub cron: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
    pub interval: String,
    pub timeout: String,
    pub url: String,
    pub expect_status: u16,
    pub body_regex: String,
    pub host: String,
    pub port: u16,
    pub restart_threshold: u32,
    pub window: String,
}

/// Validated, compiled configuration. Read-only for the rest of the run.
#[derive(Debug, Default)]
pub struct Config {
    pub sinks: SinkMap,
    pub patterns: Vec<PatternTrigger>,
    pub schedules: Vec<TimeTrigger>,
    pub checks: Vec<HealthCheck>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&contents)?;
        info!(
            "loaded {} ({} channels, {} patterns, {} schedules, {} checks)",
            path.display(),
            config.sinks.len(),
            config.patterns.len(),
            config.schedules.len(),
            config.checks.len()
        );
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_yaml::from_str(contents)?;
        Self::compile(file)
    }

    pub fn compile(file: ConfigFile) -> Result<Self, ConfigError> {
        let sinks = compile_sinks(file.channels)?;
        let mut patterns = Vec::new();
        let mut schedules = Vec::new();

        for (index, signal) in file.signals.into_iter().enumerate() {
            let label = signal_label(index, &signal.name);
            if signal.enabled == Some(false) {
                debug!("signal '{}' disabled, skipping", label);
                continue;
            }
            if signal.channel.is_empty() {
                return Err(ConfigError::SignalMissingChannel(label));
            }
            if !sinks.contains_key(&signal.channel) {
                return Err(ConfigError::SignalUnknownChannel {
                    signal: label,
                    channel: signal.channel,
                });
            }
            if signal.regex.is_empty() && signal.schedule.is_none() {
                return Err(ConfigError::SignalWithoutTrigger(label));
            }
            if let Some(schedule) = &signal.schedule {
                if signal.name.is_empty() {
                    return Err(ConfigError::ScheduleWithoutName);
                }
                schedules.push(TimeTrigger {
                    name: signal.name.clone(),
                    sink: signal.channel.clone(),
                    cadence: compile_cadence(&signal.name, schedule)?,
                });
            }
            if !signal.regex.is_empty() {
                let pattern =
                    Regex::new(&signal.regex).map_err(|source| ConfigError::InvalidPattern {
                        owner: label.clone(),
                        pattern: signal.regex.clone(),
                        source,
                    })?;
                patterns.push(PatternTrigger {
                    name: label,
                    pattern,
                    sink: signal.channel,
                });
            }
        }

        let checks = file
            .checks
            .into_iter()
            .map(|check| compile_check(check, &sinks))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sinks,
            patterns,
            schedules,
            checks,
        })
    }
}

fn signal_label(index: usize, name: &str) -> String {
    if name.is_empty() {
        format!("#{}", index + 1)
    } else {
        name.to_string()
    }
}

fn compile_sinks(channels: Vec<ChannelConfig>) -> Result<SinkMap, ConfigError> {
    let mut sinks = HashMap::with_capacity(channels.len());
    for channel in channels {
        if channel.name.is_empty() {
            return Err(ConfigError::MissingChannelName);
        }
        if sinks.contains_key(&channel.name) {
            return Err(ConfigError::DuplicateChannel(channel.name));
        }
        if channel.rate_per_sec < 0.0 {
            return Err(ConfigError::NegativeRate(channel.name));
        }
        let rate_limit = (channel.rate_per_sec > 0.0).then_some(RateLimit {
            per_sec: channel.rate_per_sec,
            burst: channel.burst.max(1),
        });
        let name = channel.name.clone();
        let kind = compile_sink_kind(channel)?;
        sinks.insert(
            name.clone(),
            Sink {
                name,
                kind,
                rate_limit,
            },
        );
    }
    Ok(sinks)
}

fn compile_sink_kind(channel: ChannelConfig) -> Result<SinkKind, ConfigError> {
    let require = |value: &str, kind: &'static str, field: &'static str| {
        if value.is_empty() {
            Err(ConfigError::MissingChannelField {
                channel: channel.name.clone(),
                kind,
                field,
            })
        } else {
            Ok(())
        }
    };

    match channel.kind.as_str() {
        "notify" => {
            require(&channel.url, "notify", "url")?;
            for (field, source) in [("url", &channel.url), ("template", &channel.template)] {
                if let Err(e) = Template::parse(source) {
                    warn!(channel = %channel.name, field, "notifications will fail to render: {e}");
                }
            }
            Ok(SinkKind::Notify {
                url: channel.url,
                template: channel.template,
            })
        }
        "publish" | "kafka" => {
            require(&channel.broker, "publish", "broker")?;
            require(&channel.topic, "publish", "topic")?;
            let sasl = (!channel.sasl_username.is_empty()).then(|| SaslCredentials {
                mechanism: channel.sasl_mechanism.clone(),
                username: channel.sasl_username.clone(),
                password: channel.sasl_password.clone(),
            });
            Ok(SinkKind::Publish(PublishTarget {
                broker: channel.broker,
                topic: channel.topic,
                tls: channel.tls,
                insecure_skip_verify: channel.tls_insecure_skip_verify,
                ca_file: channel.tls_ca_file,
                cert_file: channel.tls_cert_file,
                key_file: channel.tls_key_file,
                sasl,
            }))
        }
        "exec" => {
            require(&channel.shell, "exec", "shell")?;
            Ok(SinkKind::Exec {
                shell: channel.shell,
            })
        }
        "restart" => Ok(SinkKind::Restart),
        "kill" => Ok(SinkKind::Kill),
        "suppress" => Ok(SinkKind::Suppress),
        _ => Err(ConfigError::InvalidChannelType {
            channel: channel.name,
            kind: channel.kind,
        }),
    }
}

fn compile_cadence(name: &str, schedule: &ScheduleConfig) -> Result<Cadence, ConfigError> {
    match (schedule.every.is_empty(), schedule.cron.is_empty()) {
        (false, true) => Ok(Cadence::Every(parse_period(name, &schedule.every)?)),
        (true, false) => {
            let expr = normalize_cron_expr(&schedule.cron);
            let parsed =
                cron::Schedule::from_str(&expr).map_err(|source| ConfigError::InvalidCron {
                    owner: name.to_string(),
                    expr: schedule.cron.clone(),
                    source,
                })?;
            Ok(Cadence::Cron(Box::new(parsed)))
        }
        _ => Err(ConfigError::AmbiguousSchedule(name.to_string())),
    }
}

/// The cron crate wants a leading seconds field; classic 5-field
/// expressions fire on second 0.
pub fn normalize_cron_expr(expr: &str) -> String {
    let expr = expr.trim();
    if expr.starts_with('@') || expr.split_whitespace().count() != 5 {
        expr.to_string()
    } else {
        format!("0 {expr}")
    }
}

/// Parse a duration that must be strictly positive. Accepts humantime
/// syntax (`1m 30s`) and decimal components (`1.5s`, `0.25h`).
pub fn parse_period(owner: &str, value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    let period = match humantime::parse_duration(trimmed) {
        Ok(period) => period,
        Err(source) => {
            parse_decimal_duration(trimmed).ok_or_else(|| ConfigError::InvalidDuration {
                owner: owner.to_string(),
                value: value.to_string(),
                source,
            })?
        }
    };
    if period.is_zero() {
        return Err(ConfigError::ZeroDuration {
            owner: owner.to_string(),
            value: value.to_string(),
        });
    }
    Ok(period)
}

/// `<number><unit>` components such as `1.5s` or `1h0.5m`, units ns..h.
fn parse_decimal_duration(value: &str) -> Option<Duration> {
    let mut rest = value;
    let mut secs = 0.0_f64;
    if rest.is_empty() {
        return None;
    }
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let amount: f64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];
        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        secs += amount * scale;
        rest = &rest[unit_len..];
    }
    Duration::try_from_secs_f64(secs).ok()
}

fn compile_check(check: CheckConfig, sinks: &SinkMap) -> Result<HealthCheck, ConfigError> {
    if check.name.is_empty() {
        return Err(ConfigError::MissingCheckName);
    }
    if check.channel.is_empty() {
        return Err(ConfigError::CheckMissingChannel(check.name));
    }
    if !sinks.contains_key(&check.channel) {
        return Err(ConfigError::CheckUnknownChannel {
            check: check.name,
            channel: check.channel,
        });
    }
    let missing = |kind: &'static str, field: &'static str| ConfigError::MissingCheckField {
        check: check.name.clone(),
        kind,
        field,
    };

    let kind = match check.kind.as_str() {
        "http" => {
            if check.url.is_empty() {
                return Err(missing("http", "url"));
            }
            let body = if check.body_regex.is_empty() {
                None
            } else {
                Some(Regex::new(&check.body_regex).map_err(|source| {
                    ConfigError::InvalidPattern {
                        owner: check.name.clone(),
                        pattern: check.body_regex.clone(),
                        source,
                    }
                })?)
            };
            CheckKind::Http {
                url: check.url.clone(),
                expect_status: if check.expect_status == 0 {
                    200
                } else {
                    check.expect_status
                },
                body,
            }
        }
        "tcp" => {
            if check.host.is_empty() {
                return Err(missing("tcp", "host"));
            }
            if check.port == 0 {
                return Err(missing("tcp", "port"));
            }
            CheckKind::Tcp {
                host: check.host.clone(),
                port: check.port,
            }
        }
        "flapping" => {
            if check.restart_threshold == 0 {
                return Err(ConfigError::InvalidThreshold(check.name));
            }
            CheckKind::Flapping {
                threshold: check.restart_threshold,
                window: non_empty(check.window.clone()),
            }
        }
        _ => {
            return Err(ConfigError::InvalidCheckType {
                check: check.name,
                kind: check.kind,
            });
        }
    };

    Ok(HealthCheck {
        name: check.name,
        sink: check.channel,
        interval: check.interval,
        timeout: non_empty(check.timeout),
        kind,
    })
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
