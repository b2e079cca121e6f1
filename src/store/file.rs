//! Read-only store backed by a dotenv-style `KEY=value` file.
//!
//! Values are taken verbatim: no `$VAR` expansion and no escape processing.
//! One pair of matching surrounding quotes (`'` or `"`) is stripped. Blank
//! lines and lines starting with `#` are ignored.
//!
//! The file is read once when the store is opened. Edits are picked up only
//! after a restart. `set` and `delete` fail with [`StoreError::Unavailable`]
//! so the admin interface reports the write as failed instead of silently
//! pretending it succeeded.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{KvStore, SecretValue, StoreError};

/// Read-only file-backed store.
pub struct FileStore {
    path: PathBuf,
    /// `None` once closed.
    entries: RwLock<Option<HashMap<String, SecretValue>>>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileStore {
    /// Open the file at `path`, creating an empty one if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be created or
    /// read, or if any line fails to parse.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            create_private_file(path)?;
            info!(path = %path.display(), "created empty secrets file");
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("failed to read {}: {e}", path.display()))
        })?;

        let mut entries = HashMap::new();
        for (idx, line) in contents.lines().enumerate() {
            let Some((key, value)) = parse_line(line).map_err(|reason| {
                StoreError::Unavailable(format!(
                    "failed to parse {} line {}: {reason}",
                    path.display(),
                    idx.saturating_add(1)
                ))
            })?
            else {
                continue;
            };
            entries.insert(key.to_owned(), SecretValue::new(value));
        }
        debug!(path = %path.display(), keys = entries.len(), "loaded secrets file");

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(Some(entries)),
        })
    }

    /// Path the store was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_only(&self) -> StoreError {
        StoreError::Unavailable(format!(
            "{} is read-only; edit the file and restart",
            self.path.display()
        ))
    }
}

/// Split one line into `(key, value)`. `Ok(None)` for blank and comment
/// lines.
fn parse_line(line: &str) -> Result<Option<(&str, &str)>, &'static str> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=').ok_or("expected KEY=value")?;
    let key = key.trim();
    if key.is_empty() {
        return Err("empty key");
    }
    Ok(Some((key, unquote(value))))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

fn create_private_file(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            StoreError::Unavailable(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    fs::File::create(path).map_err(|e| {
        StoreError::Unavailable(format!("failed to create {}: {e}", path.display()))
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| {
            StoreError::Unavailable(format!(
                "failed to set permissions on {}: {e}",
                path.display()
            ))
        })?;
    }

    Ok(())
}

fn closed() -> StoreError {
    StoreError::Unavailable("store is closed".to_owned())
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<SecretValue, StoreError> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_else(closed)?;
        entries
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    async fn set(&self, _key: &str, _value: SecretValue) -> Result<(), StoreError> {
        Err(self.read_only())
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(self.read_only())
    }

    async fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let guard = self.entries.read().await;
        let entries = guard.as_ref().ok_or_else(closed)?;
        Ok(entries.keys().cloned().collect())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.entries.write().await.take();
        Ok(())
    }
}
