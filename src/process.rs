//! Process descriptor: the facts a client reports about the program it is
//! about to launch.
//!
//! Descriptors are immutable once built. Every field is always populated;
//! facts the client could not determine are replaced by sentinel values so
//! that policies never see an empty string or a missing field.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Placeholder for an unavailable machine identifier.
pub const NO_MACHINE_ID: &str = "NO_ID";

/// Placeholder for an unavailable working directory.
pub const NO_CWD: &str = "NO_CWD";

/// Placeholder for an unavailable executable path.
pub const NO_EXE: &str = "NO_EXE";

/// Placeholder for an unavailable command line.
pub const NO_CMDLINE: &str = "NO_CMDLINE";

/// Placeholder for an unavailable UID or GID.
pub const UNKNOWN_ID: u32 = u32::MAX;

/// Wire form of a descriptor, as sent by clients.
///
/// Every field is optional on the wire; missing or empty values are
/// replaced with sentinels when converted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireDescriptor {
    cmdline: Option<String>,
    cwd: Option<String>,
    exe: Option<String>,
    uid: Option<u32>,
    gid: Option<u32>,
    #[serde(rename = "machineId", alias = "machine_id")]
    machine_id: Option<String>,
    env: Option<BTreeMap<String, String>>,
}

/// Immutable snapshot of facts about a requesting process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessDescriptor {
    cmdline: String,
    cwd: String,
    exe: String,
    uid: u32,
    gid: u32,
    #[serde(rename = "machineId")]
    machine_id: String,
    env: BTreeMap<String, String>,
}

impl<'de> Deserialize<'de> for ProcessDescriptor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        WireDescriptor::deserialize(deserializer).map(Self::from_wire)
    }
}

impl ProcessDescriptor {
    fn from_wire(wire: WireDescriptor) -> Self {
        Self {
            cmdline: or_sentinel(wire.cmdline, NO_CMDLINE),
            cwd: or_sentinel(wire.cwd, NO_CWD),
            exe: or_sentinel(wire.exe, NO_EXE),
            uid: wire.uid.unwrap_or(UNKNOWN_ID),
            gid: wire.gid.unwrap_or(UNKNOWN_ID),
            machine_id: or_sentinel(wire.machine_id, NO_MACHINE_ID),
            env: wire.env.unwrap_or_default(),
        }
    }
}

fn or_sentinel(value: Option<String>, sentinel: &str) -> String {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => sentinel.to_owned(),
    }
}

impl ProcessDescriptor {
    /// Start building a descriptor for the given command line.
    pub fn builder(cmdline: impl Into<String>) -> ProcessDescriptorBuilder {
        ProcessDescriptorBuilder {
            wire: WireDescriptor {
                cmdline: Some(cmdline.into()),
                ..WireDescriptor::default()
            },
        }
    }

    /// Full command line of the process, arguments included.
    pub fn cmdline(&self) -> &str {
        &self.cmdline
    }

    /// Working directory at invocation time.
    pub fn cwd(&self) -> &str {
        &self.cwd
    }

    /// Path to the executable.
    pub fn exe(&self) -> &str {
        &self.exe
    }

    /// Effective user id of the invoking principal.
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Effective group id of the invoking principal.
    pub fn gid(&self) -> u32 {
        self.gid
    }

    /// Stable host identifier, or [`NO_MACHINE_ID`].
    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    /// The caller's own environment (not the requested secrets).
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }
}

/// Builder for [`ProcessDescriptor`]. Unset fields become sentinels.
#[derive(Debug, Default)]
pub struct ProcessDescriptorBuilder {
    wire: WireDescriptor,
}

impl ProcessDescriptorBuilder {
    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl Into<String>) -> Self {
        self.wire.cwd = Some(cwd.into());
        self
    }

    /// Set the executable path.
    pub fn exe(mut self, exe: impl Into<String>) -> Self {
        self.wire.exe = Some(exe.into());
        self
    }

    /// Set the effective UID.
    pub fn uid(mut self, uid: u32) -> Self {
        self.wire.uid = Some(uid);
        self
    }

    /// Set the effective GID.
    pub fn gid(mut self, gid: u32) -> Self {
        self.wire.gid = Some(gid);
        self
    }

    /// Set the machine identifier.
    pub fn machine_id(mut self, machine_id: impl Into<String>) -> Self {
        self.wire.machine_id = Some(machine_id.into());
        self
    }

    /// Set the caller's environment.
    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.wire.env = Some(env);
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> ProcessDescriptor {
        ProcessDescriptor::from_wire(self.wire)
    }
}
