// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Schedule runner
//! One cancellable task per time trigger, emitting a heartbeat action on
//! every tick. The same ticker drives health checks.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Local};
use metrics::counter;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::ActionRecord;
use crate::pool::WorkerPool;
use crate::state::SupervisionState;
use crate::telemetry;

/// When a time trigger fires.
#[derive(Debug, Clone)]
pub enum Cadence {
    Every(Duration),
    Cron(Box<cron::Schedule>),
}

impl Cadence {
    pub fn kind(&self) -> &'static str {
        match self {
            Cadence::Every(_) => "every",
            Cadence::Cron(_) => "cron",
        }
    }

    pub fn ticker(&self) -> Ticker {
        match self {
            Cadence::Every(period) => Ticker::every(*period),
            Cadence::Cron(schedule) => Ticker::Cron {
                schedule: schedule.clone(),
                last: None,
            },
        }
    }
}

/// A heartbeat signal bound to a sink.
#[derive(Debug, Clone)]
pub struct TimeTrigger {
    pub name: String,
    pub sink: String,
    pub cadence: Cadence,
}

pub enum Ticker {
    Every(Interval),
    Cron {
        schedule: Box<cron::Schedule>,
        last: Option<DateTime<Local>>,
    },
}

/// Next occurrence strictly after both `now` and the last fired time, so
/// an early wake-up never fires the same slot twice.
fn next_occurrence(
    schedule: &cron::Schedule,
    last: Option<DateTime<Local>>,
    now: DateTime<Local>,
) -> Option<DateTime<Local>> {
    let from = last.map_or(now, |last| last.max(now));
    schedule.after(&from).next()
}

impl Ticker {
    /// First tick lands one full period after creation.
    pub fn every(period: Duration) -> Self {
        let mut interval = interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Ticker::Every(interval)
    }

    /// Wait for the next tick. Returns false when the schedule has no
    /// upcoming occurrence.
    pub async fn tick(&mut self) -> bool {
        match self {
            Ticker::Every(interval) => {
                interval.tick().await;
                true
            }
            Ticker::Cron { schedule, last } => {
                let Some(next) = next_occurrence(schedule, *last, Local::now()) else {
                    return false;
                };
                let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                *last = Some(next);
                true
            }
        }
    }
}

/// Run `on_tick` on every tick until `cancel` fires. Cancellation is only
/// observed between ticks; a running `on_tick` always completes.
pub(crate) fn spawn_periodic<F, Fut>(
    mut ticker: Ticker,
    cancel: CancellationToken,
    mut on_tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                more = ticker.tick() => {
                    if !more {
                        break;
                    }
                    on_tick().await;
                }
            }
        }
    })
}

/// Joins every task in `tasks` after cancelling them.
pub(crate) async fn shutdown_tasks(cancel: &CancellationToken, tasks: &Mutex<Vec<JoinHandle<()>>>) {
    cancel.cancel();
    let handles: Vec<_> = tasks
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!("periodic task failed: {e}");
        }
    }
}

pub struct ScheduleRunner {
    triggers: Vec<TimeTrigger>,
    pool: Arc<WorkerPool>,
    supervision: Arc<SupervisionState>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ScheduleRunner {
    pub fn new(
        triggers: Vec<TimeTrigger>,
        pool: Arc<WorkerPool>,
        supervision: Arc<SupervisionState>,
    ) -> Self {
        Self {
            triggers,
            pool,
            supervision,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for trigger in &self.triggers {
            info!(
                schedule = %trigger.name,
                sink = %trigger.sink,
                kind = trigger.cadence.kind(),
                "starting schedule"
            );
            let trigger = Arc::new(trigger.clone());
            let pool = self.pool.clone();
            let supervision = self.supervision.clone();
            tasks.push(spawn_periodic(
                trigger.cadence.ticker(),
                self.cancel.child_token(),
                move || {
                    fire(&trigger, &pool, &supervision);
                    std::future::ready(())
                },
            ));
        }
    }

    pub async fn stop(&self) {
        shutdown_tasks(&self.cancel, &self.tasks).await;
        debug!("schedule runner stopped");
    }
}

fn fire(trigger: &TimeTrigger, pool: &WorkerPool, supervision: &SupervisionState) {
    counter!(
        telemetry::SCHEDULES_FIRED_TOTAL,
        "schedule" => trigger.name.clone(),
        "channel" => trigger.sink.clone(),
        "kind" => trigger.cadence.kind()
    )
    .increment(1);
    let pid = supervision.current_process().unwrap_or(0);
    let message = format!("schedule '{}' tick", trigger.name);
    debug!(schedule = %trigger.name, "{message}");
    if let Err(reason) = pool.enqueue(ActionRecord::synthetic(&trigger.sink, pid, message)) {
        warn!(schedule = %trigger.name, %reason, "failed to enqueue schedule action");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::handlers::Dispatcher;
    use crate::handlers::tests::{RecordingNotifier, sink, sink_map};
    use crate::sink::SinkKind;
    use crate::state::RestartHistory;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_every_ticker_waits_one_period() {
        let start = tokio::time::Instant::now();
        let mut ticker = Ticker::every(Duration::from_secs(10));
        assert!(ticker.tick().await);
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(ticker.tick().await);
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_periodic_stops_on_cancel() {
        let count = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let seen = count.clone();
        let handle = spawn_periodic(
            Ticker::every(Duration::from_secs(1)),
            cancel.clone(),
            move || {
                seen.fetch_add(1, Ordering::SeqCst);
                std::future::ready(())
            },
        );
        tokio::time::sleep(Duration::from_millis(3500)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_emits_ticks() {
        let sinks = sink_map(vec![sink(
            "hb",
            SinkKind::Notify {
                url: "https://hooks.example.com".into(),
                template: String::new(),
            },
        )]);
        let notifier = Arc::new(RecordingNotifier::default());
        let dispatcher = Dispatcher::new(
            sinks.clone(),
            notifier.clone(),
            HashMap::new(),
            Arc::new(SupervisionState::new()),
            Arc::new(RestartHistory::new()),
            Arc::new(Environment::default()),
        );
        let pool = Arc::new(WorkerPool::new(1, 10, &sinks, Arc::new(dispatcher)));
        let runner = ScheduleRunner::new(
            vec![TimeTrigger {
                name: "heartbeat".into(),
                sink: "hb".into(),
                cadence: Cadence::Every(Duration::from_secs(30)),
            }],
            pool.clone(),
            Arc::new(SupervisionState::new()),
        );

        runner.start();
        tokio::time::sleep(Duration::from_secs(65)).await;
        runner.stop().await;
        pool.start();
        pool.stop().await;

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, "schedule 'heartbeat' tick");
    }

    #[test]
    fn test_cadence_kind() {
        let cron = cron::Schedule::from_str("0 * * * * *").unwrap();
        assert_eq!(Cadence::Cron(Box::new(cron)).kind(), "cron");
        assert_eq!(Cadence::Every(Duration::from_secs(1)).kind(), "every");
    }

    #[tokio::test]
    async fn test_cron_ticker_fires_within_a_second() {
        let schedule = cron::Schedule::from_str("* * * * * *").unwrap();
        let mut ticker = Cadence::Cron(Box::new(schedule)).ticker();
        let fired = tokio::time::timeout(Duration::from_secs(3), ticker.tick()).await;
        assert_eq!(fired.ok(), Some(true));
    }

    #[test]
    fn test_cron_never_repeats_a_fired_slot() {
        let schedule = cron::Schedule::from_str("0 * * * * *").unwrap();
        let fired = Local::now() + chrono::Duration::minutes(5);
        let fired = schedule.after(&fired).next().unwrap();
        // a clock reading just before the slot that already fired
        let early = fired - chrono::Duration::milliseconds(5);
        let next = next_occurrence(&schedule, Some(fired), early).unwrap();
        assert_eq!(next - fired, chrono::Duration::minutes(1));

        let fresh = next_occurrence(&schedule, None, early).unwrap();
        assert_eq!(fresh, fired);
    }

    #[tokio::test]
    async fn test_cron_ticker_records_fired_slot() {
        let schedule = cron::Schedule::from_str("* * * * * *").unwrap();
        let mut ticker = Cadence::Cron(Box::new(schedule)).ticker();
        let before = Local::now();
        assert!(ticker.tick().await);
        let &Ticker::Cron { last: Some(first), .. } = &ticker else {
            panic!("cron ticker did not record its slot");
        };
        assert!(first > before);
        assert!(ticker.tick().await);
        let &Ticker::Cron { last: Some(second), .. } = &ticker else {
            panic!("cron ticker did not record its slot");
        };
        assert_eq!(second - first, chrono::Duration::seconds(1));
    }
}
