//! Policies decide which secret keys a process may see.
//!
//! Policies are allow-only: each one contributes a set of key names and the
//! engine unions them. There is no deny rule; a key nobody grants is simply
//! never released.
//!
//! Policies are pure functions of the descriptor and their own immutable
//! configuration, so a single instance is shared by every concurrent
//! evaluation without locking.

use std::collections::BTreeSet;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use crate::process::{ProcessDescriptor, NO_MACHINE_ID};

/// Set of key names granted by a policy.
pub type KeySet = BTreeSet<String>;

/// Policy construction errors. Raised at startup, never per request.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A pattern, key list, or selector is malformed.
    #[error("invalid policy configuration: {0}")]
    InvalidConfiguration(String),
}

/// Grants a fixed key set when a regex matches the command line.
///
/// The regex is searched over the whole command line, not just the program
/// name, so patterns can target specific flags or arguments. Anchor with
/// `^` to match from the start.
#[derive(Debug, Clone)]
pub struct CmdlinePolicy {
    pattern: Regex,
    allowed_keys: KeySet,
}

impl CmdlinePolicy {
    /// Compile `pattern` and pair it with `allowed_keys`.
    ///
    /// An empty pattern is rejected because it matches every command line;
    /// write `.*` when a wildcard is really intended. An empty key set is
    /// accepted but never grants anything.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfiguration`] for empty or
    /// uncompilable patterns.
    pub fn new<I, S>(pattern: &str, allowed_keys: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if pattern.is_empty() {
            return Err(PolicyError::InvalidConfiguration(
                "cmdline pattern must not be empty (use \".*\" to match everything)".to_owned(),
            ));
        }
        let pattern = Regex::new(pattern).map_err(|e| {
            PolicyError::InvalidConfiguration(format!("invalid cmdline pattern {pattern:?}: {e}"))
        })?;
        Ok(Self {
            pattern,
            allowed_keys: allowed_keys.into_iter().map(Into::into).collect(),
        })
    }

    /// The source text of the compiled pattern.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Keys granted when the pattern matches.
    pub fn keys(&self) -> &KeySet {
        &self.allowed_keys
    }

    /// Keys this policy grants to `process`.
    pub fn allowed_keys(&self, process: &ProcessDescriptor) -> KeySet {
        if self.allowed_keys.is_empty() || !self.pattern.is_match(process.cmdline()) {
            return KeySet::new();
        }
        self.allowed_keys.clone()
    }
}

/// Grants a fixed key set to processes on specific hosts.
///
/// Matching is exact on the machine identifier. A descriptor carrying the
/// "unknown machine" sentinel never matches.
#[derive(Debug, Clone)]
pub struct MachinePolicy {
    machine_ids: BTreeSet<String>,
    allowed_keys: KeySet,
}

impl MachinePolicy {
    /// Pair a set of machine identifiers with `allowed_keys`.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfiguration`] when no machine id is
    /// given, or when one is empty or equal to the unknown-machine sentinel.
    pub fn new<M, I, S>(machine_ids: M, allowed_keys: I) -> Result<Self, PolicyError>
    where
        M: IntoIterator<Item = S>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let machine_ids: BTreeSet<String> = machine_ids.into_iter().map(Into::into).collect();
        if machine_ids.is_empty() {
            return Err(PolicyError::InvalidConfiguration(
                "machine policy needs at least one machine id".to_owned(),
            ));
        }
        if let Some(bad) = machine_ids
            .iter()
            .find(|id| id.is_empty() || id.as_str() == NO_MACHINE_ID)
        {
            return Err(PolicyError::InvalidConfiguration(format!(
                "machine id {bad:?} is not a valid host identifier"
            )));
        }
        Ok(Self {
            machine_ids,
            allowed_keys: allowed_keys.into_iter().map(Into::into).collect(),
        })
    }

    /// Keys this policy grants to `process`.
    pub fn allowed_keys(&self, process: &ProcessDescriptor) -> KeySet {
        if process.machine_id() == NO_MACHINE_ID || !self.machine_ids.contains(process.machine_id())
        {
            return KeySet::new();
        }
        self.allowed_keys.clone()
    }
}

/// All supported policy strategies.
#[derive(Debug, Clone)]
pub enum Policy {
    /// Regex over the command line.
    Cmdline(CmdlinePolicy),
    /// Exact match on the machine identifier.
    Machine(MachinePolicy),
}

impl Policy {
    /// Keys this policy grants to `process`. Total and side-effect free.
    pub fn allowed_keys(&self, process: &ProcessDescriptor) -> KeySet {
        match self {
            Self::Cmdline(p) => p.allowed_keys(process),
            Self::Machine(p) => p.allowed_keys(process),
        }
    }

    /// Short strategy name, as written in the config file.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Cmdline(_) => "cmdline",
            Self::Machine(_) => "machine",
        }
    }
}

impl From<CmdlinePolicy> for Policy {
    fn from(policy: CmdlinePolicy) -> Self {
        Self::Cmdline(policy)
    }
}

impl From<MachinePolicy> for Policy {
    fn from(policy: MachinePolicy) -> Self {
        Self::Machine(policy)
    }
}

/// A `[[policies]]` entry in `kevd.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PolicyConfig {
    /// `type = "cmdline"`.
    Cmdline {
        /// Regex searched over the full command line.
        cmd: String,
        /// Keys granted on match.
        allowed_keys: Vec<String>,
    },
    /// `type = "machine"`.
    Machine {
        /// Host identifiers the keys are released to.
        machine_ids: Vec<String>,
        /// Keys granted on match.
        allowed_keys: Vec<String>,
    },
}

impl PolicyConfig {
    /// Validate and compile this entry.
    ///
    /// Stricter than the bare constructors: an empty or blank key list is
    /// a configuration mistake here.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfiguration`] for malformed patterns,
    /// empty key lists, blank key names, or bad machine ids.
    pub fn build(&self) -> Result<Policy, PolicyError> {
        match self {
            Self::Cmdline { cmd, allowed_keys } => {
                check_keys(allowed_keys)?;
                Ok(CmdlinePolicy::new(cmd, allowed_keys.iter().cloned())?.into())
            }
            Self::Machine {
                machine_ids,
                allowed_keys,
            } => {
                check_keys(allowed_keys)?;
                Ok(MachinePolicy::new(machine_ids.iter().cloned(), allowed_keys.iter().cloned())?
                    .into())
            }
        }
    }
}

fn check_keys(keys: &[String]) -> Result<(), PolicyError> {
    if keys.is_empty() {
        return Err(PolicyError::InvalidConfiguration(
            "allowed_keys must list at least one key".to_owned(),
        ));
    }
    if keys.iter().any(|k| k.trim().is_empty()) {
        return Err(PolicyError::InvalidConfiguration(
            "allowed_keys must not contain blank names".to_owned(),
        ));
    }
    Ok(())
}

/// Build every configured policy, failing on the first invalid entry.
///
/// # Errors
///
/// Returns [`PolicyError::InvalidConfiguration`] naming the offending entry
/// by its position in the config file (1-based).
pub fn build_policies(configs: &[PolicyConfig]) -> Result<Vec<Policy>, PolicyError> {
    configs
        .iter()
        .enumerate()
        .map(|(idx, config)| {
            config.build().map_err(|PolicyError::InvalidConfiguration(msg)| {
                PolicyError::InvalidConfiguration(format!("policy #{}: {msg}", idx.saturating_add(1)))
            })
        })
        .collect()
}
