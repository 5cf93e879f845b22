// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Broker publishing over a Kafka REST proxy

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::CONTENT_TYPE;
use serde_json::json;
use tracing::{info, warn};

use crate::errors::{ActionError, ConfigError};
use crate::ports::Publisher;
use crate::sink::{PublishTarget, SaslCredentials, SinkKind, SinkMap};

const BINARY_V2: &str = "application/vnd.kafka.binary.v2+json";

/// Publisher bound to one broker endpoint with its TLS and credential
/// settings applied.
pub struct RestProxyPublisher {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<SaslCredentials>,
}

impl RestProxyPublisher {
    pub fn connect(channel: &str, target: &PublishTarget) -> Result<Self, ConfigError> {
        let fail = |reason: String| ConfigError::Publisher {
            channel: channel.to_string(),
            reason,
        };

        let mut builder = reqwest::Client::builder();
        if let Some(ca) = &target.ca_file {
            let pem = read_pem(ca).map_err(&fail)?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| fail(format!("loading CA {}: {e}", ca.display())))?;
            builder = builder.add_root_certificate(cert);
        }
        match (&target.cert_file, &target.key_file) {
            (Some(cert), Some(key)) => {
                let mut pem = read_pem(cert).map_err(&fail)?;
                pem.push(b'\n');
                pem.extend(read_pem(key).map_err(&fail)?);
                let identity = reqwest::Identity::from_pem(&pem)
                    .map_err(|e| fail(format!("loading client certificate: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(fail(
                    "tls_cert_file and tls_key_file must be set together".to_string(),
                ));
            }
        }
        if target.insecure_skip_verify {
            warn!(channel, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(sasl) = &target.sasl
            && !sasl.mechanism.is_empty()
            && !sasl.mechanism.eq_ignore_ascii_case("plain")
        {
            warn!(
                channel,
                mechanism = %sasl.mechanism,
                "only PLAIN credentials are supported, sending as basic auth"
            );
        }

        let client = builder.build().map_err(|e| fail(e.to_string()))?;
        let base_url = broker_url(&target.broker, target.tls);
        info!(channel, broker = %base_url, topic = %target.topic, "publisher ready");
        Ok(Self {
            client,
            base_url,
            credentials: target.sasl.clone(),
        })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("reading {}: {e}", path.display()))
}

fn broker_url(broker: &str, tls: bool) -> String {
    let broker = broker.trim_end_matches('/');
    if broker.contains("://") {
        broker.to_string()
    } else if tls {
        format!("https://{broker}")
    } else {
        format!("http://{broker}")
    }
}

fn records_body(payload: &[u8]) -> serde_json::Value {
    json!({ "records": [{ "value": STANDARD.encode(payload) }] })
}

#[async_trait]
impl Publisher for RestProxyPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ActionError> {
        let mut request = self
            .client
            .post(format!("{}/topics/{}", self.base_url, topic))
            .header(CONTENT_TYPE, BINARY_V2)
            .body(records_body(payload).to_string());
        if let Some(creds) = &self.credentials {
            request = request.basic_auth(&creds.username, Some(&creds.password));
        }
        let response = request
            .send()
            .await
            .map_err(|e| ActionError::Publish(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActionError::Publish(format!("broker returned {status}")));
        }
        Ok(())
    }
}

/// Build one publisher per publish sink. Any failure is fatal at startup.
pub fn connect_publishers(
    sinks: &SinkMap,
) -> Result<HashMap<String, Arc<dyn Publisher>>, ConfigError> {
    let mut publishers: HashMap<String, Arc<dyn Publisher>> = HashMap::new();
    for sink in sinks.values() {
        if let SinkKind::Publish(target) = &sink.kind {
            let publisher = RestProxyPublisher::connect(&sink.name, target)?;
            publishers.insert(sink.name.clone(), Arc::new(publisher));
        }
    }
    Ok(publishers)
}
