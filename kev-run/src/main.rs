//! kev-run CLI entry point.
//!
//! `kev-run [--server URI] [--user U --password P] -- <program> [args...]`
//! asks kevd for the secrets `<program>` may receive, then runs it with
//! those secrets in its environment and exits with its exit code.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use kev_run::client::{BrokerClient, Credentials};
use kev_run::{facts, launch};

/// kev-run — launch a program with the secrets kevd releases to it.
#[derive(Parser)]
#[command(name = "kev-run", version, about)]
struct Cli {
    /// Broker endpoint, e.g. http://127.0.0.1:8080/env.
    #[arg(short, long, env = "KEVD_URI")]
    server: String,

    /// Basic-auth username.
    #[arg(short, long, env = "KEVD_USER", requires = "password")]
    user: Option<String>,

    /// Basic-auth password.
    #[arg(short, long, env = "KEVD_PASSWORD", requires = "user", hide_env_values = true)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'v', long, default_value = "warn")]
    log_level: String,

    /// Program to run, followed by its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    kev::logging::init_cli(&cli.log_level);

    let credentials = match (cli.user, cli.password) {
        (Some(user), Some(password)) => Some(Credentials { user, password }),
        _ => None,
    };
    let client = BrokerClient::new(&cli.server, credentials)?;

    let process = facts::gather(&cli.command);
    debug!(
        cmdline = process.cmdline(),
        exe = process.exe(),
        machine_id = process.machine_id(),
        "gathered process facts"
    );

    let secrets = client
        .fetch_env(&process)
        .await
        .context("refusing to launch without an answer from kevd")?;
    info!(released = secrets.len(), "secrets received");

    let code = launch::run(&cli.command, &secrets).await?;
    Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
}
