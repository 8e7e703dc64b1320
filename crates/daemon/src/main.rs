// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! `mgmtd`: loads a resource-set description and drives it to
//! convergence, then keeps watching and reconciling until signalled to
//! stop.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mgmt_adapters::LocalWorld;
use mgmt_core::{Resource, World};
use mgmt_engine::{Engine, EngineConfig};
use mgmt_engine::handle::ProgramInfo;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum DaemonError {
    #[error("{0}")]
    Config(#[from] config::ConfigError),
    #[error("{0}")]
    Engine(#[from] mgmt_engine::EngineError),
    #[error("resource {0} failed validation: {1}")]
    Invalid(String, mgmt_core::MgmtError),
    #[error("creating var_dir {0}: {1}")]
    VarDir(PathBuf, std::io::Error),
}

#[derive(Parser)]
#[command(name = "mgmtd", version, about = "Host-state reconciliation daemon")]
struct Cli {
    /// Write logs to this file instead of stderr (non-blocking appender).
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate every resource in the config and exit without running.
    Check {
        /// Path to the resource-set TOML file.
        config: PathBuf,
    },
    /// Validate, converge, and keep watching until SIGTERM/SIGINT.
    Run {
        /// Path to the resource-set TOML file.
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_file.as_deref());

    let result = match &cli.command {
        Command::Check { config } => run_check(config).await,
        Command::Run { config } => run_daemon(config).await,
    };

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "mgmtd exiting with an error");
            std::process::ExitCode::FAILURE
        }
    }
}

/// Non-blocking stderr logging by default; `--log-file` switches to a
/// non-blocking file appender. The returned guard must stay alive for
/// the process lifetime or buffered lines are lost on exit.
fn init_tracing(log_file: Option<&std::path::Path>) -> tracing_appender::non_blocking::WorkerGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (writer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().map(|n| n.to_owned()).unwrap_or_else(|| "mgmtd.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            tracing_appender::non_blocking(appender)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer).init();
    guard
}

async fn run_check(config_path: &std::path::Path) -> Result<(), DaemonError> {
    let file = config::load(config_path)?;
    let specs = config::build_specs(&file)?;
    for spec in &specs {
        spec.resource
            .validate()
            .map_err(|e| DaemonError::Invalid(spec.resource.meta().to_string(), e))?;
    }
    info!(count = specs.len(), "all resources passed validation");
    Ok(())
}

async fn run_daemon(config_path: &std::path::Path) -> Result<(), DaemonError> {
    let file = config::load(config_path)?;
    let specs = config::build_specs(&file)?;

    let hostname = file
        .daemon
        .hostname
        .clone()
        .unwrap_or_else(|| std::fs::read_to_string("/proc/sys/kernel/hostname").map(|s| s.trim().to_string()).unwrap_or_else(|_| "localhost".to_string()));
    let world_root = file.daemon.world_root.clone().unwrap_or_else(|| file.daemon.var_dir.join("world"));
    std::fs::create_dir_all(&file.daemon.var_dir)
        .map_err(|e| DaemonError::VarDir(file.daemon.var_dir.clone(), e))?;
    let world: Arc<dyn World> = Arc::new(LocalWorld::new(world_root));

    let engine_config = EngineConfig {
        var_dir_root: file.daemon.var_dir.clone(),
        program: Arc::new(ProgramInfo {
            program: "mgmtd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            debug: file.daemon.debug,
        }),
        world,
    };

    let ctx = CancellationToken::new();
    let shutdown_ctx = ctx.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received, cancelling reconciliation");
        shutdown_ctx.cancel();
    });

    info!(count = specs.len(), var_dir = %engine_config.var_dir_root.display(), "starting reconciliation");
    let engine = Engine::new(engine_config);
    engine.run(specs, ctx).await?;
    info!("all resources stopped cleanly");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler, falling back to ctrl_c only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = term.recv() => {}
        _ = tokio::signal::ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
