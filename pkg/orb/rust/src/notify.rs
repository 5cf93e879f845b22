// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::errors::ActionError;
use crate::ports::Notifier;

/// Posts `{"text": message}` to http(s) webhooks. `generic+` prefixed URLs
/// are accepted for compatibility with shoutrrr-style destinations.
pub struct WebhookNotifier {
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

fn webhook_url(destination: &str) -> Result<reqwest::Url, ActionError> {
    let trimmed = destination.strip_prefix("generic+").unwrap_or(destination);
    let url = reqwest::Url::parse(trimmed)
        .map_err(|e| ActionError::Notify(format!("invalid destination: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ActionError::Notify(format!(
            "unsupported notification scheme '{other}'"
        ))),
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), ActionError> {
        let url = webhook_url(destination)?;
        debug!(host = url.host_str().unwrap_or_default(), "sending notification");
        let response = self
            .client
            .post(url)
            .json(&json!({ "text": message }))
            .send()
            .await
            .map_err(|e| ActionError::Notify(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Notify(format!("webhook returned {status}")));
        }
        Ok(())
    }
}
