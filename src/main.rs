//! kevd CLI entry point.
//!
//! Provides `start`, `check`, and `default-config` subcommands for running
//! the broker, validating a configuration, or writing the default one.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use kev::config::{default_config_path, expand_home, load_config, write_default_config};
use kev::engine::PolicyEngine;
use kev::logging::{self, LoggingGuard};
use kev::server::{admin_router, env_router, serve};

/// kevd — policy-gated secrets broker.
#[derive(Parser)]
#[command(name = "kevd", version, about)]
struct Cli {
    /// Path to the config file (default: ~/.kevd/kevd.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(short = 'v', long, global = true)]
    log_level: Option<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run the broker.
    Start,
    /// Validate the configuration and policies, then exit.
    Check,
    /// Write the default configuration to the config path.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => expand_home(&path)?,
        None => default_config_path()?,
    };

    match cli.command {
        Command::Start => handle_start(config_path, cli.log_level).await,
        Command::Check => handle_check(config_path, cli.log_level),
        Command::DefaultConfig => handle_default_config(config_path),
    }
}

/// Run the broker until Ctrl-C / SIGTERM or a listener fails.
async fn handle_start(config_path: PathBuf, log_level: Option<String>) -> anyhow::Result<()> {
    let config = load_config(&config_path)?;
    let level = log_level.unwrap_or_else(|| config.log.level.clone());

    let _logging_guard: Option<LoggingGuard> = match &config.log.dir {
        Some(dir) => Some(logging::init_production(&expand_home(dir)?, &level)?),
        None => {
            logging::init_cli(&level);
            None
        }
    };

    let policies = config.build_policies()?;
    if policies.is_empty() {
        warn!("no policies configured; no secret will ever be released");
    }
    info!(
        config = %config_path.display(),
        policies = policies.len(),
        store = ?config.store.kind,
        "configuration loaded"
    );

    let store = config.store.open().await?;
    let engine = Arc::new(PolicyEngine::new(Arc::clone(&store), policies));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut servers = JoinSet::new();

    let rest_addr = config.rest_listen()?;
    let rest = env_router(
        Arc::clone(&engine),
        &config.rest.base_path,
        config.rest.auth.to_users(),
    );
    let rest_shutdown = wait_for_shutdown(shutdown_rx.clone());
    servers.spawn(async move { serve(&rest_addr, rest, rest_shutdown).await });

    if config.admin.enabled {
        let admin_addr = config.admin_listen()?;
        let admin = admin_router(
            Arc::clone(&store),
            &config.admin.base_path,
            config.admin.auth.to_users(),
        );
        if !config.admin.auth.to_users().is_enabled() {
            warn!("admin interface enabled without authentication");
        }
        let admin_shutdown = wait_for_shutdown(shutdown_rx.clone());
        servers.spawn(async move { serve(&admin_addr, admin, admin_shutdown).await });
    }

    let mut outcome = Ok(());
    tokio::select! {
        () = shutdown_signal() => info!("shutdown requested"),
        Some(joined) = servers.join_next() => {
            outcome = joined.context("listener task panicked").and_then(|r| r);
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(joined) = servers.join_next().await {
        let result = joined.context("listener task panicked").and_then(|r| r);
        if outcome.is_ok() {
            outcome = result;
        }
    }

    if let Err(e) = store.close().await {
        warn!(error = %e, "failed to close store cleanly");
    }
    info!("kevd stopped");
    outcome
}

/// Validate config and policies without starting listeners.
fn handle_check(config_path: PathBuf, log_level: Option<String>) -> anyhow::Result<()> {
    logging::init_cli(log_level.as_deref().unwrap_or("warn"));
    let config = load_config(&config_path)?;
    let policies = config.build_policies()?;
    println!("config OK: {}", config_path.display());
    println!("  store: {:?}", config.store.kind);
    println!("  rest: {}{}", config.rest.listen, config.rest.base_path);
    if config.admin.enabled {
        println!("  admin: {}{}", config.admin.listen, config.admin.base_path);
    }
    println!("  policies: {}", policies.len());
    for (idx, policy) in policies.iter().enumerate() {
        println!("    #{} {}", idx.saturating_add(1), policy.kind());
    }
    Ok(())
}

/// Write the embedded default config.
fn handle_default_config(config_path: PathBuf) -> anyhow::Result<()> {
    write_default_config(&config_path)?;
    println!("wrote default config to {}", config_path.display());
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
