// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Health probe implementation
//! Performs HTTP, TCP and flapping checks

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::checks::{ArmedCheck, CheckKind};
use crate::errors::ProbeError;
use crate::ports::Probe;
use crate::state::RestartHistory;

/// Standard probe: reqwest for HTTP, tokio sockets for TCP, restart history
/// for flapping.
pub struct StandardProbe {
    client: reqwest::Client,
    history: Arc<RestartHistory>,
}

impl StandardProbe {
    pub fn new(history: Arc<RestartHistory>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, history })
    }
}

#[async_trait]
impl Probe for StandardProbe {
    async fn run(&self, check: &ArmedCheck) -> Result<(), ProbeError> {
        match &check.check.kind {
            CheckKind::Http {
                url,
                expect_status,
                body,
            } => {
                perform_http_check(&self.client, url, *expect_status, body.as_ref(), check.timeout)
                    .await
            }
            CheckKind::Tcp { host, port } => perform_tcp_check(host, *port, check.timeout).await,
            CheckKind::Flapping { threshold, .. } => {
                perform_flapping_check(&self.history, *threshold, check.window)
            }
        }
    }
}

/// HTTP health check
async fn perform_http_check(
    client: &reqwest::Client,
    url: &str,
    expected_status: u16,
    body_pattern: Option<&Regex>,
    timeout: Duration,
) -> Result<(), ProbeError> {
    debug!("Performing HTTP health check: GET {} (expecting {})", url, expected_status);

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ProbeError::Request(e.to_string()))?;

    let status = response.status().as_u16();
    if status != expected_status {
        return Err(ProbeError::Status {
            got: status,
            expected: expected_status,
        });
    }

    if let Some(pattern) = body_pattern {
        let body = response
            .text()
            .await
            .map_err(|e| ProbeError::Request(e.to_string()))?;
        if !pattern.is_match(&body) {
            return Err(ProbeError::Body);
        }
    }
    Ok(())
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// TCP health check
async fn perform_tcp_check(host: &str, port: u16, timeout: Duration) -> Result<(), ProbeError> {
    let addr = join_host_port(host, port);
    debug!("Performing TCP health check: {}", addr);

    match tokio::time::timeout(timeout, tokio::net::TcpStream::connect(&addr)).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Dial {
            addr,
            reason: e.to_string(),
        }),
        Err(_) => Err(ProbeError::DialTimeout(addr)),
    }
}

/// Flapping check: too many restarts inside the trailing window
fn perform_flapping_check(
    history: &RestartHistory,
    threshold: u32,
    window: Duration,
) -> Result<(), ProbeError> {
    let count = history.count_recent(window);
    debug!("Restart count in last {:?}: {} (threshold {})", window, count, threshold);
    if count >= threshold as usize {
        return Err(ProbeError::Flapping {
            count,
            window: humantime::format_duration(window).to_string(),
            threshold,
        });
    }
    Ok(())
}
