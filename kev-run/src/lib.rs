//! kev-run — launches a program with the secrets kevd releases to it.
//!
//! Gathers facts about the program about to run, asks the broker which
//! secrets that process may receive, and starts the program with those
//! secrets layered over the inherited environment.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Broker HTTP client.
pub mod client;
/// Process fact gathering.
pub mod facts;
/// Child process launch.
pub mod launch;
