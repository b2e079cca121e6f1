//! Configuration loading and validation for `kevd`.
//!
//! A single `kevd.toml` holds logging, store, listener, and policy settings.
//! Every section has defaults, so a file containing only `[[policies]]` is
//! valid. The configuration is loaded once at startup and passed by
//! reference to the components that need it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::policy::{build_policies, Policy, PolicyConfig};
use crate::server::{BasicAuthUsers, ListenAddr};
use crate::store::{FileStore, InMemoryStore, KvStore, SqliteStore};

/// Default configuration written by `kevd default-config`.
pub const DEFAULT_CONFIG: &str = include_str!("../kevd.default.toml");

/// Top-level `kevd` configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KevdConfig {
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,

    /// Secret store backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Listener answering process descriptors.
    #[serde(default)]
    pub rest: RestConfig,

    /// Optional write-only admin listener.
    #[serde(default)]
    pub admin: AdminConfig,

    /// Allow-only access policies.
    #[serde(default)]
    pub policies: Vec<PolicyConfig>,
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for JSON log files. Stderr only when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

/// Store backend kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Volatile in-memory map.
    Memory,
    /// Read-only dotenv-style file.
    File,
    /// Durable SQLite database.
    #[default]
    Sqlite,
}

/// Secret store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// Backend kind.
    #[serde(rename = "type", default)]
    pub kind: StoreKind,

    /// Backend location. `~/` is expanded. Defaults under `~/.kevd/`.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve the on-disk location for file and sqlite backends.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn resolved_path(&self) -> anyhow::Result<PathBuf> {
        match &self.path {
            Some(path) => expand_home(path),
            None => {
                let name = match self.kind {
                    StoreKind::File => "secrets.env",
                    StoreKind::Memory | StoreKind::Sqlite => "kv.db",
                };
                Ok(config_dir()?.join(name))
            }
        }
    }

    /// Open the configured backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    pub async fn open(&self) -> anyhow::Result<Arc<dyn KvStore>> {
        let store: Arc<dyn KvStore> = match self.kind {
            StoreKind::Memory => Arc::new(InMemoryStore::new()),
            StoreKind::File => {
                let path = self.resolved_path()?;
                Arc::new(
                    FileStore::open(&path)
                        .with_context(|| format!("failed to open file store {}", path.display()))?,
                )
            }
            StoreKind::Sqlite => {
                let path = self.resolved_path()?;
                Arc::new(
                    SqliteStore::open(&path).await.with_context(|| {
                        format!("failed to open sqlite store {}", path.display())
                    })?,
                )
            }
        };
        Ok(store)
    }
}

/// Basic-auth user table. An empty table disables authentication.
#[derive(Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// `user = "password"` pairs.
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("users", &self.users.keys().collect::<Vec<_>>())
            .field("passwords", &"[REDACTED]")
            .finish()
    }
}

impl AuthConfig {
    /// Build the runtime credential table.
    pub fn to_users(&self) -> BasicAuthUsers {
        BasicAuthUsers::new(self.users.iter().map(|(u, p)| (u.clone(), p.clone())))
    }
}

/// Env listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    /// `tcp://host:port` or `unix:///path`.
    #[serde(default = "default_rest_listen")]
    pub listen: String,

    /// Route serving process descriptors.
    #[serde(default = "default_rest_base_path")]
    pub base_path: String,

    /// Basic-auth credentials.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            listen: default_rest_listen(),
            base_path: default_rest_base_path(),
            auth: AuthConfig::default(),
        }
    }
}

/// Admin listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Whether the admin listener is started.
    #[serde(default)]
    pub enabled: bool,

    /// `tcp://host:port` or `unix:///path`.
    #[serde(default = "default_admin_listen")]
    pub listen: String,

    /// Route accepting `PUT` writes.
    #[serde(default = "default_admin_base_path")]
    pub base_path: String,

    /// Basic-auth credentials.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_admin_listen(),
            base_path: default_admin_base_path(),
            auth: AuthConfig::default(),
        }
    }
}

impl KevdConfig {
    /// Parse a TOML string without validating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed.
    pub fn from_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str).context("failed to parse config TOML")
    }

    /// Validate listeners, routes, and policies.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> anyhow::Result<()> {
        let rest_addr = self.rest_listen()?;
        anyhow::ensure!(
            self.rest.base_path.starts_with('/'),
            "rest.base_path must start with '/'"
        );
        if self.admin.enabled {
            let admin_addr = self.admin_listen()?;
            anyhow::ensure!(
                self.admin.base_path.starts_with('/'),
                "admin.base_path must start with '/'"
            );
            anyhow::ensure!(
                admin_addr != rest_addr,
                "admin.listen must differ from rest.listen"
            );
        }
        anyhow::ensure!(
            self.store.kind != StoreKind::File || self.store.path.is_some(),
            "store.path is required for the file store"
        );
        self.build_policies()?;
        Ok(())
    }

    /// Parsed env listener address.
    ///
    /// # Errors
    ///
    /// Returns an error if `rest.listen` is not a valid address.
    pub fn rest_listen(&self) -> anyhow::Result<ListenAddr> {
        self.rest.listen.parse().context("invalid rest.listen")
    }

    /// Parsed admin listener address.
    ///
    /// # Errors
    ///
    /// Returns an error if `admin.listen` is not a valid address.
    pub fn admin_listen(&self) -> anyhow::Result<ListenAddr> {
        self.admin.listen.parse().context("invalid admin.listen")
    }

    /// Compile every `[[policies]]` entry.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid entry.
    pub fn build_policies(&self) -> anyhow::Result<Vec<Policy>> {
        build_policies(&self.policies).context("invalid [[policies]] entry")
    }
}

/// Load, parse, and validate a config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed, or fails validation.
pub fn load_config(path: &Path) -> anyhow::Result<KevdConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    let config: KevdConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid config at {}", path.display()))?;
    Ok(config)
}

/// Write [`DEFAULT_CONFIG`] to `path`, refusing to overwrite.
///
/// # Errors
///
/// Returns an error if the file exists or cannot be written.
pub fn write_default_config(path: &Path) -> anyhow::Result<()> {
    anyhow::ensure!(
        !path.exists(),
        "refusing to overwrite existing config at {}",
        path.display()
    );
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

/// Resolve the default config directory (`~/.kevd/`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".kevd"))
}

/// Default config file location (`~/.kevd/kevd.toml`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join("kevd.toml"))
}

/// Expand a leading `~` to the home directory.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn expand_home(path: &Path) -> anyhow::Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = directories::BaseDirs::new()
                .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
            Ok(home.home_dir().join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

// Default value functions for serde

fn default_log_level() -> String {
    "info".to_owned()
}
fn default_rest_listen() -> String {
    "tcp://127.0.0.1:8080".to_owned()
}
fn default_rest_base_path() -> String {
    "/env".to_owned()
}
fn default_admin_listen() -> String {
    "tcp://127.0.0.1:8081".to_owned()
}
fn default_admin_base_path() -> String {
    "/kv".to_owned()
}
