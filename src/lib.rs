//! kev — a secrets broker.
//!
//! `kevd` holds a key/value store of secret material and releases entries
//! to a requesting process only when a configured policy grants that
//! process access to the specific key. Clients describe the process they
//! are about to launch; the broker answers with exactly the authorized
//! subset, which the client injects as environment variables.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod engine;
pub mod logging;
pub mod policy;
pub mod process;
pub mod server;
pub mod store;

pub use engine::{AllowedEnv, EngineError, PolicyEngine};
pub use policy::{CmdlinePolicy, MachinePolicy, Policy, PolicyError};
pub use process::ProcessDescriptor;
pub use store::{KvStore, SecretValue, StoreError};
