//! The `kev-run` binary end to end.

use assert_cmd::Command;
use kev::server::BasicAuthUsers;

use crate::support::{secret_store, spawn_broker};

fn kev_run() -> Command {
    let mut cmd = Command::cargo_bin("kev-run").expect("kev-run binary should build");
    cmd.env_remove("KEVD_URI")
        .env_remove("KEVD_USER")
        .env_remove("KEVD_PASSWORD");
    cmd
}

#[test]
fn missing_server_is_a_usage_error() {
    let output = kev_run().args(["--", "true"]).output().expect("run");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--server"));
}

#[test]
fn missing_command_is_a_usage_error() {
    let output = kev_run()
        .args(["--server", "http://127.0.0.1:1/env"])
        .output()
        .expect("run");
    assert!(!output.status.success());
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn child_receives_secret_and_exit_code() {
    let uri = spawn_broker(secret_store(), BasicAuthUsers::default()).await;

    let output = tokio::task::spawn_blocking(move || {
        kev_run()
            .env("KEVD_URI", &uri)
            .args(["--", "sh", "-c", "printf %s \"$DB_PASSWORD\"; exit 3"])
            .output()
            .expect("run")
    })
    .await
    .expect("join");

    assert_eq!(output.status.code(), Some(3));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "secret123");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ungranted_program_runs_without_secrets() {
    let uri = spawn_broker(secret_store(), BasicAuthUsers::default()).await;

    let output = tokio::task::spawn_blocking(move || {
        kev_run()
            .args(["--server", uri.as_str(), "--", "env"])
            .output()
            .expect("run")
    })
    .await
    .expect("join");

    assert!(output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains("secret123"));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broker_refusal_prevents_launch() {
    let users = BasicAuthUsers::new([("deployer", "hunter2")]);
    let uri = spawn_broker(secret_store(), users).await;
    let marker = tempfile::tempdir().expect("tempdir");
    let marker_file = marker.path().join("launched");
    let script = format!("touch {}", marker_file.display());

    let output = tokio::task::spawn_blocking(move || {
        kev_run()
            .args(["--server", uri.as_str(), "--", "sh", "-c", script.as_str()])
            .output()
            .expect("run")
    })
    .await
    .expect("join");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("401"));
    assert!(!marker_file.exists(), "program must not run without an answer");
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn credentials_flags_authenticate() {
    let users = BasicAuthUsers::new([("deployer", "hunter2")]);
    let uri = spawn_broker(secret_store(), users).await;

    let output = tokio::task::spawn_blocking(move || {
        kev_run()
            .args([
                "--server",
                uri.as_str(),
                "--user",
                "deployer",
                "--password",
                "hunter2",
                "--",
                "sh",
                "-c",
                "printf %s \"$DB_PASSWORD\"",
            ])
            .output()
            .expect("run")
    })
    .await
    .expect("join");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "secret123");
}
