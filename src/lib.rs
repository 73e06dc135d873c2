//! launchsd manages the launchd service descriptor of a long running background program.
//!
//! It generates the property list launchd reads from ~/Library/LaunchAgents, installs it, asks launchd to load it,
//! reports on the state of the service and removes it again. By default it describes the `wechat-backup` program as
//! installed by homebrew, running in `--service` mode at login with its output captured in /tmp/wechat-backup.log.
//!
//! What is explicitly in scope of this project
//! 1. Deterministic generation of the descriptor and parsing it back
//! 1. The install -> register -> unregister lifecycle for the current user (gui/<uid> domain)
//! 1. Both the modern (bootstrap/bootout) and legacy (load/unload) launchctl interfaces
//!
//! What is explicitly out of scope:
//! 1. The background program itself
//! 1. System wide LaunchDaemons
//! 1. Retrying failed operations. These are one-shot administrative actions, failures are reported right away.

pub mod config;
pub mod descriptor;
pub mod environment;
pub mod errors;
pub mod logging;
pub mod manager;
pub mod supervisor;

mod entrypoints;
pub use entrypoints::*;

#[cfg(test)]
mod tests;
