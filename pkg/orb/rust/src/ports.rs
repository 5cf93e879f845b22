// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Collaborator interfaces
//! Outbound delivery and probing, swappable for fakes in tests

use async_trait::async_trait;

use crate::checks::ArmedCheck;
use crate::errors::{ActionError, ProbeError};

/// Sends a rendered message to a destination URL.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, message: &str) -> Result<(), ActionError>;
}

/// Produces one record to a topic. One instance per publish sink, built at
/// startup.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ActionError>;
}

/// Runs a single health probe.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn run(&self, check: &ArmedCheck) -> Result<(), ProbeError>;
}
