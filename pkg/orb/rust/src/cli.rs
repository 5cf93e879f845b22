// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::exporter::DEFAULT_METRICS_ADDR;
use crate::pool::DEFAULT_WORKERS;

const MAX_WORKERS: usize = 100;

/// Supervise a command, react to its output, health and schedules
#[derive(Parser, Debug, Clone)]
#[command(name = "orb", version)]
#[command(about = "Supervise a command and dispatch actions on its output, health checks and schedules")]
pub struct Args {
    /// Path to the YAML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Number of workers executing actions (1-100)
    #[arg(short, long, default_value_t = DEFAULT_WORKERS, value_parser = parse_workers)]
    pub workers: usize,

    /// Serve Prometheus metrics
    #[arg(long)]
    pub metrics_enable: bool,

    /// Address for the metrics endpoint
    #[arg(long, default_value = DEFAULT_METRICS_ADDR)]
    pub metrics_addr: SocketAddr,

    /// Extra environment file to load (repeatable)
    #[arg(long = "env", value_name = "FILE")]
    pub env_files: Vec<PathBuf>,

    /// Do not load ./.env
    #[arg(long)]
    pub skip_dotenv: bool,

    /// Command to supervise, with its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

fn parse_workers(raw: &str) -> Result<usize, String> {
    let workers: usize = raw.parse().map_err(|e| format!("{e}"))?;
    if (1..=MAX_WORKERS).contains(&workers) {
        Ok(workers)
    } else {
        Err(format!("must be between 1 and {MAX_WORKERS}"))
    }
}
