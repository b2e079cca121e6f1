//! Policy engine: the single authorization decision point.
//!
//! For each request the engine unions every policy's grants, intersects the
//! result with the keys present in the store, and reads the surviving keys.
//! Nothing is cached between requests, so a rotated secret is served on the
//! very next evaluation.
//!
//! Failure model is fail-closed. A key that disappears between listing and
//! reading is omitted. Any other store failure aborts the whole evaluation;
//! no partial answer is released.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::policy::{KeySet, Policy};
use crate::process::ProcessDescriptor;
use crate::store::{KvStore, SecretValue, StoreError};

/// Evaluation failure.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store could not be read; nothing is released.
    #[error("secret store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Key/value pairs a process is authorized to receive.
///
/// `Debug` output redacts values. `Serialize` writes a flat JSON object
/// with the values exposed, for the response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedEnv(BTreeMap<String, SecretValue>);

impl AllowedEnv {
    /// Number of released keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was released.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Exposed value for `key`, if released.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(SecretValue::expose)
    }

    /// Released key names, sorted.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Consume into a plain map with exposed values.
    pub fn into_exposed(self) -> BTreeMap<String, String> {
        self.0
            .into_iter()
            .map(|(k, v)| (k, v.expose().to_owned()))
            .collect()
    }
}

impl Serialize for AllowedEnv {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value.expose())?;
        }
        map.end()
    }
}

/// Notable events during an evaluation.
#[derive(Debug)]
pub enum EvaluationEvent<'a> {
    /// An evaluation finished and released `released` of `granted` keys.
    Completed {
        /// The requesting process.
        process: &'a ProcessDescriptor,
        /// Size of the union of all grants.
        granted: usize,
        /// Keys actually released.
        released: usize,
    },
    /// A granted key was listed but gone by the time it was read.
    KeyVanished {
        /// The key that disappeared.
        key: &'a str,
    },
    /// The store failed and the evaluation was aborted.
    Failed {
        /// The underlying store error.
        error: &'a StoreError,
    },
}

/// Observability hook injected into the engine.
///
/// Implementations must not block. Secret values are never passed in.
pub trait EvaluationObserver: Send + Sync {
    /// Called for every [`EvaluationEvent`].
    fn observe(&self, event: &EvaluationEvent<'_>);
}

/// Default observer: forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EvaluationObserver for TracingObserver {
    fn observe(&self, event: &EvaluationEvent<'_>) {
        match event {
            EvaluationEvent::Completed {
                process,
                granted,
                released,
            } => debug!(
                exe = process.exe(),
                uid = process.uid(),
                machine_id = process.machine_id(),
                granted,
                released,
                "evaluated secret request"
            ),
            EvaluationEvent::KeyVanished { key } => {
                warn!(key, "granted key vanished between list and read; omitted")
            }
            EvaluationEvent::Failed { error } => {
                error!(error = %error, "secret store failed during evaluation")
            }
        }
    }
}

/// Combines policies with a store into filtered answers.
///
/// Immutable after construction and safe to share across concurrent
/// requests behind an `Arc`.
pub struct PolicyEngine {
    store: Arc<dyn KvStore>,
    policies: Vec<Policy>,
    observer: Arc<dyn EvaluationObserver>,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("policies", &self.policies)
            .finish_non_exhaustive()
    }
}

impl PolicyEngine {
    /// Create an engine over `store` with a fixed policy set.
    pub fn new(store: Arc<dyn KvStore>, policies: Vec<Policy>) -> Self {
        Self {
            store,
            policies,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: Arc<dyn EvaluationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Configured policies, in config order.
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Union of every policy's grants for `process`.
    pub fn granted_keys(&self, process: &ProcessDescriptor) -> KeySet {
        self.policies
            .iter()
            .flat_map(|policy| policy.allowed_keys(process))
            .collect()
    }

    /// Compute the secrets `process` may receive.
    ///
    /// Granted keys absent from the store are omitted without error. The
    /// returned map may be empty.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::StoreUnavailable`] if the store cannot be
    /// listed or read. No partial result is returned in that case.
    pub async fn allowed_env(
        &self,
        process: &ProcessDescriptor,
    ) -> Result<AllowedEnv, EngineError> {
        let granted = self.granted_keys(process);

        let present = match self.store.list_keys().await {
            Ok(keys) => keys,
            Err(err) => return Err(self.fail(err)),
        };

        let mut env = BTreeMap::new();
        for key in present.into_iter().filter(|k| granted.contains(k)) {
            match self.store.get(&key).await {
                Ok(value) => {
                    env.insert(key, value);
                }
                Err(StoreError::NotFound(_)) => {
                    self.observer
                        .observe(&EvaluationEvent::KeyVanished { key: &key });
                }
                Err(err) => return Err(self.fail(err)),
            }
        }

        self.observer.observe(&EvaluationEvent::Completed {
            process,
            granted: granted.len(),
            released: env.len(),
        });
        Ok(AllowedEnv(env))
    }

    fn fail(&self, err: StoreError) -> EngineError {
        self.observer.observe(&EvaluationEvent::Failed { error: &err });
        EngineError::StoreUnavailable(err.to_string())
    }
}
