//! Coverage for config parsing, validation, and path resolution.

use std::path::Path;

use kev::config::{load_config, write_default_config, KevdConfig, StoreKind, DEFAULT_CONFIG};
use kev::server::ListenAddr;
use kev::Policy;

fn validation_error(toml_str: &str) -> String {
    let config = KevdConfig::from_toml(toml_str).expect("config should parse");
    match config.validate() {
        Ok(()) => panic!("config should be rejected:\n{toml_str}"),
        Err(err) => format!("{err:#}"),
    }
}

#[test]
fn empty_config_uses_defaults() {
    let config = KevdConfig::from_toml("").expect("empty config should parse");
    config.validate().expect("defaults should validate");

    assert_eq!(config.log.level, "info");
    assert_eq!(config.store.kind, StoreKind::Sqlite);
    assert_eq!(config.rest.base_path, "/env");
    assert!(!config.admin.enabled);
    assert!(config.policies.is_empty());
    assert_eq!(
        config.rest_listen().expect("listen"),
        ListenAddr::Tcp("127.0.0.1:8080".to_owned())
    );
}

#[test]
fn embedded_default_config_parses_with_a_policy() {
    let config = KevdConfig::from_toml(DEFAULT_CONFIG).expect("default config should parse");
    let policies = config.build_policies().expect("default policies");
    assert!(!policies.is_empty());
    assert!(policies.iter().all(|p| matches!(p, Policy::Cmdline(_))));
}

#[test]
fn parses_full_config() {
    let toml_str = r#"
[log]
level = "debug"
dir = "/var/log/kevd"

[store]
type = "file"
path = "/etc/kevd/secrets.env"

[rest]
listen = "unix:///run/kevd/kevd.sock"
base_path = "/secrets"

[rest.auth.users]
deployer = "hunter2"

[admin]
enabled = true
listen = "tcp://127.0.0.1:9091"
base_path = "/kv"

[admin.auth.users]
root = "s3cret"

[[policies]]
type = "cmdline"
cmd = "^deploy "
allowed_keys = ["DB_PASSWORD"]

[[policies]]
type = "machine"
machine_ids = ["4c4c4544003"]
allowed_keys = ["CI_TOKEN", "DB_PASSWORD"]
"#;
    let config = KevdConfig::from_toml(toml_str).expect("full config should parse");
    config.validate().expect("full config should validate");

    assert_eq!(config.log.dir.as_deref(), Some(Path::new("/var/log/kevd")));
    assert_eq!(config.store.kind, StoreKind::File);
    assert_eq!(
        config.rest_listen().expect("listen"),
        ListenAddr::Unix("/run/kevd/kevd.sock".into())
    );
    assert!(config.rest.auth.to_users().verify("deployer", "hunter2"));
    assert!(config.admin.auth.to_users().verify("root", "s3cret"));
    assert!(!config.admin.auth.to_users().verify("deployer", "hunter2"));

    let policies = config.build_policies().expect("policies");
    assert_eq!(policies.len(), 2);
    assert_eq!(policies[0].kind(), "cmdline");
    assert_eq!(policies[1].kind(), "machine");
}

#[test]
fn rejects_bad_listen_address() {
    let err = validation_error("[rest]\nlisten = \"http://127.0.0.1:8080\"\n");
    assert!(err.contains("rest.listen"), "{err}");
}

#[test]
fn rejects_relative_base_path() {
    let err = validation_error("[rest]\nbase_path = \"env\"\n");
    assert!(err.contains("base_path"), "{err}");
}

#[test]
fn rejects_admin_sharing_rest_listener() {
    let err = validation_error(
        r#"
[rest]
listen = "tcp://127.0.0.1:8080"

[admin]
enabled = true
listen = "tcp://127.0.0.1:8080"
"#,
    );
    assert!(err.contains("admin.listen"), "{err}");
}

#[test]
fn disabled_admin_is_not_validated() {
    let config = KevdConfig::from_toml("[admin]\nlisten = \"garbage\"\n").expect("parse");
    config.validate().expect("disabled admin listener is ignored");
}

#[test]
fn file_store_requires_explicit_path() {
    let err = validation_error("[store]\ntype = \"file\"\n");
    assert!(err.contains("store.path"), "{err}");
}

#[test]
fn sqlite_store_defaults_path_under_kevd_dir() {
    let config = KevdConfig::from_toml("[store]\ntype = \"sqlite\"\n").expect("parse");
    config.validate().expect("sqlite without a path should validate");
    let path = config.store.resolved_path().expect("resolve path");
    assert!(path.ends_with(".kevd/kv.db"), "{}", path.display());
}

#[test]
fn rejects_empty_cmdline_pattern() {
    let err = validation_error(
        r#"
[[policies]]
type = "cmdline"
cmd = ""
allowed_keys = ["K"]
"#,
    );
    assert!(err.contains("policy #1"), "{err}");
}

#[test]
fn rejects_invalid_regex() {
    let err = validation_error(
        r#"
[[policies]]
type = "cmdline"
cmd = "^deploy ("
allowed_keys = ["K"]
"#,
    );
    assert!(err.contains("pattern"), "{err}");
}

#[test]
fn rejects_policy_without_keys() {
    let err = validation_error(
        r#"
[[policies]]
type = "cmdline"
cmd = ".*"
allowed_keys = []
"#,
    );
    assert!(err.contains("policy #1"), "{err}");
}

#[test]
fn rejects_unknown_policy_type() {
    let toml_str = r#"
[[policies]]
type = "uid"
allowed_keys = ["K"]
"#;
    assert!(KevdConfig::from_toml(toml_str).is_err());
}

#[test]
fn load_config_reads_and_validates_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kevd.toml");
    std::fs::write(
        &path,
        "[store]\ntype = \"memory\"\n\n[[policies]]\ntype = \"cmdline\"\ncmd = \"^ci\"\nallowed_keys = [\"CI_TOKEN\"]\n",
    )
    .expect("write config");

    let config = load_config(&path).expect("load");
    assert_eq!(config.store.kind, StoreKind::Memory);
    assert_eq!(config.policies.len(), 1);
}

#[test]
fn load_config_reports_missing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load_config(&dir.path().join("absent.toml")).expect_err("missing file");
    assert!(format!("{err:#}").contains("failed to read config"));
}

#[test]
fn default_config_is_written_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("nested").join("kevd.toml");

    write_default_config(&path).expect("first write");
    assert_eq!(
        std::fs::read_to_string(&path).expect("read back"),
        DEFAULT_CONFIG
    );
    assert!(write_default_config(&path).is_err());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
