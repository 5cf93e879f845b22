// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use green_orb::app::{self, Options};
use green_orb::cli::Args;
use green_orb::config::Config;
use green_orb::env::Environment;
use green_orb::supervisor::FAILURE_EXIT_CODE;
use tracing::info;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // stdout belongs to the supervised command
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("green-orb {} starting", env!("CARGO_PKG_VERSION"));

    let env = Environment::inherit()
        .load(&args.env_files, args.skip_dotenv)
        .context("loading environment files")?;
    let config = Config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;

    let mut options = Options::new(args.workers, args.command);
    if args.metrics_enable {
        options.metrics_addr = Some(args.metrics_addr);
    }

    let code = app::run(options, config, env).await?;
    Ok(ExitCode::from(
        u8::try_from(code).unwrap_or(FAILURE_EXIT_CODE as u8),
    ))
}
