// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Worker pool
//! Bounded queue with non-blocking admission, per-sink rate limits and a
//! fixed set of workers executing actions

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use metrics::{counter, gauge};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::action::ActionRecord;
use crate::handlers::Dispatcher;
use crate::rate_limit::TokenBucket;
use crate::sink::SinkMap;
use crate::telemetry;

pub const DEFAULT_QUEUE_SIZE: usize = 100;
pub const DEFAULT_WORKERS: usize = 5;

/// Why an admission was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    RateLimited,
    QueueFull,
    Stopped,
}

impl DropReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DropReason::RateLimited => "rate_limited",
            DropReason::QueueFull => "queue_full",
            DropReason::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counts of refused admissions, by reason.
#[derive(Debug, Default)]
pub struct DropCounters {
    rate_limited: AtomicU64,
    queue_full: AtomicU64,
    stopped: AtomicU64,
}

impl DropCounters {
    fn record(&self, reason: DropReason) {
        let slot = match reason {
            DropReason::RateLimited => &self.rate_limited,
            DropReason::QueueFull => &self.queue_full,
            DropReason::Stopped => &self.stopped,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!(telemetry::DROPPED_EVENTS_TOTAL, "reason" => reason.as_str()).increment(1);
    }

    pub fn get(&self, reason: DropReason) -> u64 {
        match reason {
            DropReason::RateLimited => self.rate_limited.load(Ordering::Relaxed),
            DropReason::QueueFull => self.queue_full.load(Ordering::Relaxed),
            DropReason::Stopped => self.stopped.load(Ordering::Relaxed),
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<ActionRecord>>>;

pub struct WorkerPool {
    num_workers: usize,
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<ActionRecord>>>,
    receiver: Mutex<Option<mpsc::Receiver<ActionRecord>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    limiters: HashMap<String, Mutex<TokenBucket>>,
    dispatcher: Arc<Dispatcher>,
    drops: DropCounters,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl WorkerPool {
    /// Build a pool with `queue_size` slots. A queue size of zero admits
    /// nothing.
    pub fn new(
        num_workers: usize,
        queue_size: usize,
        sinks: &SinkMap,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        let (sender, receiver) = if queue_size > 0 {
            let (tx, rx) = mpsc::channel(queue_size);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let limiters = sinks
            .values()
            .filter_map(|sink| {
                let limit = sink.rate_limit?;
                Some((
                    sink.name.clone(),
                    Mutex::new(TokenBucket::new(limit.per_sec, limit.burst)),
                ))
            })
            .collect();

        Self {
            num_workers: num_workers.max(1),
            capacity: queue_size,
            sender: Mutex::new(sender),
            receiver: Mutex::new(receiver),
            workers: Mutex::new(Vec::new()),
            limiters,
            dispatcher,
            drops: DropCounters::default(),
        }
    }

    /// Launch the workers. Calling this twice is a no-op.
    pub fn start(&self) {
        let Some(receiver) = lock(&self.receiver).take() else {
            debug!("worker pool already started or has no queue");
            return;
        };
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut workers = lock(&self.workers);
        for id in 0..self.num_workers {
            let receiver = receiver.clone();
            let dispatcher = self.dispatcher.clone();
            workers.push(tokio::spawn(run_worker(id, receiver, dispatcher)));
        }
        info!(
            "started {} workers (queue size {})",
            self.num_workers, self.capacity
        );
    }

    /// Offer a record without waiting. Rate limits are checked first, then
    /// queue space; a refused record is counted and discarded.
    pub fn enqueue(&self, record: ActionRecord) -> Result<(), DropReason> {
        if let Some(limiter) = self.limiters.get(&record.sink)
            && !lock(limiter).allow()
        {
            return Err(self.refuse(DropReason::RateLimited));
        }

        let sender = lock(&self.sender);
        let Some(tx) = sender.as_ref() else {
            let reason = if self.capacity == 0 {
                DropReason::QueueFull
            } else {
                DropReason::Stopped
            };
            return Err(self.refuse(reason));
        };
        match tx.try_send(record) {
            Ok(()) => {
                gauge!(telemetry::QUEUE_DEPTH).set(queue_depth(tx) as f64);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(self.refuse(DropReason::QueueFull)),
            Err(TrySendError::Closed(_)) => Err(self.refuse(DropReason::Stopped)),
        }
    }

    fn refuse(&self, reason: DropReason) -> DropReason {
        self.drops.record(reason);
        reason
    }

    /// Stop accepting records, let the workers drain the queue, and wait for
    /// in-flight actions to finish.
    pub async fn stop(&self) {
        drop(lock(&self.sender).take());
        // never started: nothing will drain, drop what is queued
        drop(lock(&self.receiver).take());
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("worker task failed: {e}");
            }
        }
        debug!("worker pool stopped");
    }

    /// Records currently waiting for a worker.
    pub fn depth(&self) -> usize {
        lock(&self.sender).as_ref().map(queue_depth).unwrap_or(0)
    }

    pub fn drops(&self) -> &DropCounters {
        &self.drops
    }
}

fn queue_depth(tx: &mpsc::Sender<ActionRecord>) -> usize {
    tx.max_capacity() - tx.capacity()
}

async fn run_worker(id: usize, receiver: SharedReceiver, dispatcher: Arc<Dispatcher>) {
    loop {
        let next = {
            let mut rx = receiver.lock().await;
            let next = rx.recv().await;
            gauge!(telemetry::QUEUE_DEPTH).set(rx.len() as f64);
            next
        };
        let Some(record) = next else {
            break;
        };
        debug!(worker = id, sink = %record.sink, "executing action");
        dispatcher.dispatch(record).await;
    }
    debug!(worker = id, "worker exiting");
}
