//! Start the target program with released secrets in its environment.

use std::collections::BTreeMap;
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::process::Command;

/// Exit code reported when the child ended without one.
const ABNORMAL_EXIT: i32 = 1;

/// Launch failure.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No program was given.
    #[error("no command given")]
    EmptyCommand,
    /// The program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Build the child command: inherited environment and stdio, with
/// `secrets` overriding same-named variables.
///
/// # Errors
///
/// Returns [`LaunchError::EmptyCommand`] if `command` is empty.
pub fn command(
    command: &[String],
    secrets: &BTreeMap<String, String>,
) -> Result<Command, LaunchError> {
    let (program, args) = command.split_first().ok_or(LaunchError::EmptyCommand)?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(secrets)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    Ok(cmd)
}

/// Run `command` to completion and return its exit code.
///
/// # Errors
///
/// Returns [`LaunchError`] if the command is empty or cannot be started.
pub async fn run(
    command_line: &[String],
    secrets: &BTreeMap<String, String>,
) -> Result<i32, LaunchError> {
    let mut cmd = command(command_line, secrets)?;
    let status = cmd.status().await.map_err(|source| LaunchError::Spawn {
        program: command_line.first().cloned().unwrap_or_default(),
        source,
    })?;
    Ok(exit_code(status))
}

/// Shell-style exit code: the child's own code, or `128 + signal` when it
/// was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return signal.saturating_add(128);
        }
    }
    ABNORMAL_EXIT
}
