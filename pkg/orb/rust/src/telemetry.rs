// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Metric names. Everything goes through the `metrics` facade, which is a
//! no-op until a recorder is installed.

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};

pub const EVENTS_TOTAL: &str = "orb_events_total";
pub const SIGNALS_MATCHED_TOTAL: &str = "orb_signals_matched_total";
pub const ACTIONS_TOTAL: &str = "orb_actions_total";
pub const ACTION_LATENCY_SECONDS: &str = "orb_action_latency_seconds";
pub const DROPPED_EVENTS_TOTAL: &str = "orb_dropped_events_total";
pub const CHECKS_TOTAL: &str = "orb_checks_total";
pub const SCHEDULES_FIRED_TOTAL: &str = "orb_schedules_fired_total";
pub const RESTARTS_TOTAL: &str = "orb_restarts_total";
pub const QUEUE_DEPTH: &str = "orb_queue_depth";
pub const OBSERVED_PID: &str = "orb_observed_pid";

/// Register help text. Call after the recorder is installed.
pub fn describe() {
    describe_counter!(EVENTS_TOTAL, "Lines read from the child, by stream");
    describe_counter!(SIGNALS_MATCHED_TOTAL, "Pattern matches, by signal and channel");
    describe_counter!(ACTIONS_TOTAL, "Actions executed, by channel, type and outcome");
    describe_histogram!(
        ACTION_LATENCY_SECONDS,
        Unit::Seconds,
        "Time spent executing an action"
    );
    describe_counter!(DROPPED_EVENTS_TOTAL, "Actions dropped before execution, by reason");
    describe_counter!(CHECKS_TOTAL, "Health check runs, by type and outcome");
    describe_counter!(SCHEDULES_FIRED_TOTAL, "Schedule ticks, by schedule, channel and kind");
    describe_counter!(RESTARTS_TOTAL, "Restarts requested by restart actions");
    describe_gauge!(QUEUE_DEPTH, "Actions waiting in the queue");
    describe_gauge!(OBSERVED_PID, "PID of the supervised child, 0 when none");
}
