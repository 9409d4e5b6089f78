// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terraform Applier Daemon (tfad)
//!
//! Background process that reconciles terraform modules and runs them.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::path::PathBuf;

use tfa_core::Config;
use tfa_daemon::lifecycle::{self, LifecycleError};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

const USAGE: &str = "usage: tfad [CONFIG.toml]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse arguments
    let config_path = match std::env::args().nth(1).as_deref() {
        Some("-h") | Some("--help") => {
            println!("{}", USAGE);
            return Ok(());
        }
        Some("-V") | Some("--version") => {
            println!("tfad {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(path) => Some(PathBuf::from(path)),
        None => None,
    };

    // Load configuration
    let config = match &config_path {
        Some(path) => Config::load(path).map_err(LifecycleError::from)?,
        None => Config::default(),
    };

    // Set up logging
    let log_guard = setup_logging(&config)?;

    // Start daemon
    let daemon = match lifecycle::startup(&config) {
        Ok(d) => d,
        Err(e) => {
            error!("Failed to start daemon: {}", e);
            drop(log_guard);
            return Err(e.into());
        }
    };
    let shutdown = daemon.shutdown_token();

    // Set up signal handlers
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let mut running = tokio::spawn(daemon.run());
    info!("Daemon ready, data root {}", config.data_root.display());

    // Signal ready for parent process (e.g., systemd, test harness)
    println!("READY");

    let finished = tokio::select! {
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down...");
            None
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down...");
            None
        }
        result = &mut running => Some(result),
    };
    let result = match finished {
        Some(result) => result,
        None => {
            shutdown.cancel();
            running.await
        }
    };

    if let Err(e) = result.map_err(LifecycleError::from).and_then(|r| r) {
        error!("Daemon failed: {}", e);
        drop(log_guard);
        return Err(e.into());
    }

    info!("Daemon stopped");
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let (non_blocking, guard) = match &config.log_path {
        Some(log_path) => {
            let dir = match log_path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;
            let file_name = log_path.file_name().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("log_path {} has no file name", log_path.display()),
                )
            })?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name))
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    // Set up subscriber with env filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}
