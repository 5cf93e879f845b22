// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

pub mod action;
pub mod app;
pub mod checks;
pub mod cli;
pub mod config;
pub mod env;
pub mod errors;
pub mod exporter;
pub mod handlers;
pub mod monitor;
pub mod notify;
pub mod pool;
pub mod ports;
pub mod probe;
pub mod publish;
pub mod rate_limit;
pub mod schedule;
pub mod signals;
pub mod sink;
pub mod state;
pub mod supervisor;
pub mod telemetry;
pub mod template;
