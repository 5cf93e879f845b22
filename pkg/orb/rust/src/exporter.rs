// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Prometheus exposition
//!
//! A `metrics::Recorder` that keeps counters, gauges and bucketed histograms
//! in memory, and a small hyper server that renders them as text at
//! `/metrics`.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics::{
    Counter, Gauge, Histogram, HistogramFn, Key, KeyName, Metadata, Recorder, SharedString, Unit,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_METRICS_ADDR: &str = "0.0.0.0:9090";

static NOTFOUND: &[u8] = b"Not found";
const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Upper bounds shared by every histogram, matching Prometheus' default
/// buckets.
const BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Cumulative bucket counts, count and sum of observed values.
#[derive(Debug, Default)]
struct Distribution {
    buckets: [AtomicU64; BUCKETS.len()],
    count: AtomicU64,
    sum_bits: AtomicU64,
}

impl HistogramFn for Distribution {
    fn record(&self, value: f64) {
        for (bound, bucket) in BUCKETS.iter().zip(&self.buckets) {
            if value <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
    }
}

#[derive(Debug, Default)]
struct Registry {
    counters: RwLock<HashMap<Key, Arc<AtomicU64>>>,
    gauges: RwLock<HashMap<Key, Arc<AtomicU64>>>,
    histograms: RwLock<HashMap<Key, Arc<Distribution>>>,
    help: RwLock<HashMap<String, String>>,
}

fn get_or_insert<T: Default>(map: &RwLock<HashMap<Key, Arc<T>>>, key: &Key) -> Arc<T> {
    if let Some(existing) = map.read().unwrap_or_else(PoisonError::into_inner).get(key) {
        return existing.clone();
    }
    map.write()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(key.clone())
        .or_default()
        .clone()
}

/// Recorder installed globally when the metrics endpoint is enabled.
#[derive(Debug, Default)]
pub struct PrometheusRecorder {
    registry: Arc<Registry>,
}

/// Read side of the recorder, used to render the exposition.
#[derive(Debug, Clone)]
pub struct PrometheusHandle {
    registry: Arc<Registry>,
}

impl PrometheusRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> PrometheusHandle {
        PrometheusHandle {
            registry: self.registry.clone(),
        }
    }

    fn describe(&self, key: KeyName, description: SharedString) {
        self.registry
            .help
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.as_str().to_string(), description.to_string());
    }
}

impl Recorder for PrometheusRecorder {
    fn describe_counter(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_gauge(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn describe_histogram(&self, key: KeyName, _unit: Option<Unit>, description: SharedString) {
        self.describe(key, description);
    }

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(get_or_insert(&self.registry.counters, key))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(get_or_insert(&self.registry.gauges, key))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(get_or_insert(&self.registry.histograms, key))
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn series(name: &str, key: &Key) -> String {
    labelled(name, key, None)
}

fn labelled(name: &str, key: &Key, extra: Option<(&str, &str)>) -> String {
    let labels: Vec<String> = key
        .labels()
        .map(|label| (label.key(), label.value()))
        .chain(extra)
        .map(|(k, v)| format!("{k}=\"{}\"", escape(v)))
        .collect();
    if labels.is_empty() {
        name.to_string()
    } else {
        format!("{name}{{{}}}", labels.join(","))
    }
}

impl PrometheusHandle {
    /// Render every registered metric in Prometheus text format, sorted by
    /// metric name.
    pub fn render(&self) -> String {
        let registry = &self.registry;
        // name -> (type, sample lines)
        let mut families: HashMap<String, (&'static str, Vec<String>)> = HashMap::new();

        for (key, value) in registry.counters.read().unwrap_or_else(PoisonError::into_inner).iter() {
            let name = key.name().to_string();
            let line = format!("{} {}", series(&name, key), value.load(Ordering::Relaxed));
            families.entry(name).or_insert(("counter", Vec::new())).1.push(line);
        }
        for (key, value) in registry.gauges.read().unwrap_or_else(PoisonError::into_inner).iter() {
            let name = key.name().to_string();
            let line = format!(
                "{} {}",
                series(&name, key),
                f64::from_bits(value.load(Ordering::Relaxed))
            );
            families.entry(name).or_insert(("gauge", Vec::new())).1.push(line);
        }
        for (key, dist) in registry
            .histograms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            let name = key.name().to_string();
            let sum = f64::from_bits(dist.sum_bits.load(Ordering::Relaxed));
            let count = dist.count.load(Ordering::Relaxed);
            let bucket_name = format!("{name}_bucket");
            let family = families.entry(name.clone()).or_insert(("histogram", Vec::new()));
            for (bound, bucket) in BUCKETS.iter().zip(&dist.buckets) {
                let le = bound.to_string();
                family.1.push(format!(
                    "{} {}",
                    labelled(&bucket_name, key, Some(("le", le.as_str()))),
                    bucket.load(Ordering::Relaxed)
                ));
            }
            family.1.push(format!(
                "{} {}",
                labelled(&bucket_name, key, Some(("le", "+Inf"))),
                count
            ));
            family.1.push(format!("{} {}", series(&format!("{name}_sum"), key), sum));
            family.1.push(format!("{} {}", series(&format!("{name}_count"), key), count));
        }

        let help = registry.help.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = families.keys().collect();
        names.sort();
        let mut out = String::new();
        for name in names {
            let Some((kind, lines)) = families.get(name) else {
                continue;
            };
            if let Some(text) = help.get(name) {
                let _ = writeln!(out, "# HELP {name} {text}");
            }
            let _ = writeln!(out, "# TYPE {name} {kind}");
            for line in lines {
                let _ = writeln!(out, "{line}");
            }
        }
        out
    }
}

fn respond(req: &Request<Incoming>, handle: &PrometheusHandle) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut response = Response::new(Full::new(Bytes::from(handle.render())));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
            response
        }
        _ => {
            debug!(
                "{} Request to unknown endpoint: {}",
                req.method(),
                req.uri().path()
            );
            let mut response = Response::new(Full::new(Bytes::from_static(NOTFOUND)));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        }
    }
}

pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!("metrics endpoint listening on http://{}/metrics", listener.local_addr()?);
    Ok(listener)
}

/// Serve `/metrics` until `cancel` fires.
pub async fn serve(listener: TcpListener, handle: PrometheusHandle, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                let stream = match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!("metrics accept failed: {e}");
                        continue;
                    }
                };
                let io = TokioIo::new(stream);
                let handle = handle.clone();
                tokio::task::spawn(async move {
                    let service = service_fn(move |req| {
                        let response = respond(&req, &handle);
                        async move { Ok::<_, Infallible>(response) }
                    });
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("metrics connection error: {err}");
                    }
                });
            }
        }
    }
    debug!("metrics endpoint stopped");
}
