//! Facts about the process about to be launched.
//!
//! Every probe is best effort. A fact that cannot be determined is left
//! out and the descriptor carries its sentinel instead.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use kev::ProcessDescriptor;

/// Locations checked for the host identifier, in order.
pub const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Describe `command` (program followed by its arguments) as it would be
/// launched from the current process.
pub fn gather(command: &[String]) -> ProcessDescriptor {
    let mut builder = ProcessDescriptor::builder(cmdline(command)).env(current_env());

    if let Ok(cwd) = std::env::current_dir() {
        builder = builder.cwd(cwd.to_string_lossy());
    }
    if let Some(exe) = command.first().and_then(|program| resolve_exe(program)) {
        builder = builder.exe(exe.to_string_lossy());
    }
    if let Some((uid, gid)) = effective_ids() {
        builder = builder.uid(uid).gid(gid);
    }
    if let Some(id) = read_machine_id(&MACHINE_ID_PATHS) {
        builder = builder.machine_id(id);
    }
    builder.build()
}

/// The command line policies match against: arguments joined by spaces.
pub fn cmdline(command: &[String]) -> String {
    command.join(" ")
}

/// Resolve `program` through `PATH`, or relative to the working directory
/// when it contains a path separator.
pub fn resolve_exe(program: &str) -> Option<PathBuf> {
    if program.is_empty() {
        return None;
    }
    which::which(program).ok()
}

/// First non-empty machine id found among `paths`.
pub fn read_machine_id<P: AsRef<Path>>(paths: &[P]) -> Option<String> {
    paths.iter().find_map(|path| {
        let contents = std::fs::read_to_string(path).ok()?;
        let id = contents.trim();
        (!id.is_empty()).then(|| id.to_owned())
    })
}

/// Effective uid and gid, read from the owner of `/proc/self`.
#[cfg(unix)]
pub fn effective_ids() -> Option<(u32, u32)> {
    use std::os::unix::fs::MetadataExt;

    let metadata = std::fs::metadata("/proc/self").ok()?;
    Some((metadata.uid(), metadata.gid()))
}

/// Effective ids are not available on this platform.
#[cfg(not(unix))]
pub fn effective_ids() -> Option<(u32, u32)> {
    None
}

/// Current environment. Entries that are not valid UTF-8 are skipped.
pub fn current_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}
