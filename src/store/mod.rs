//! Key/value store abstraction for secret material.
//!
//! The policy engine depends only on [`KvStore`]. Each backend is a separate
//! adapter; backend options (file paths, pool settings) never leak into the
//! engine's API.
//!
//! Concurrency contract: concurrent reads never observe torn data, and a
//! write may interleave with an in-flight evaluation. `list_keys` followed
//! by `get` is therefore not transactional; callers must tolerate
//! [`StoreError::NotFound`] for a key that was listed a moment earlier.

pub mod file;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested key does not exist.
    #[error("key not found: {0}")]
    NotFound(String),
    /// The backend cannot service the call (closed, read-only, I/O failure).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Opaque secret value that never appears in logs.
///
/// Debug output always shows `__REDACTED__`.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Create a new secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value. Use only when releasing it to a client.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("__REDACTED__")
    }
}

/// Capability contract every secret store backend satisfies.
///
/// Keys are case-sensitive. `list_keys` carries no ordering guarantee.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Retrieve the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when absent, [`StoreError::Unavailable`] when
    /// the backend cannot be read.
    async fn get(&self, key: &str) -> Result<SecretValue, StoreError>;

    /// Insert or overwrite the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if the backend is closed or read-only.
    async fn set(&self, key: &str, value: SecretValue) -> Result<(), StoreError>;

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when absent, [`StoreError::Unavailable`] if
    /// the backend is closed or read-only.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Snapshot of the keys present at call time. Values are never returned.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] when the backend cannot be read.
    async fn list_keys(&self) -> Result<Vec<String>, StoreError>;

    /// Release underlying resources. Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`StoreError::Unavailable`] if resources could not be released.
    async fn close(&self) -> Result<(), StoreError>;
}
