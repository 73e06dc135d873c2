//! The service supervisor is the os component that actually starts and stops the background process. On macOS
//! that is launchd, driven through `launchctl`. Everything that talks to it goes through the `ServiceSupervisor`
//! trait so the lifecycle can be exercised without touching the real user session.

mod launchctl;

pub use launchctl::*;

use crate::errors::RegistrationError;
use std::path::Path;

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum SupervisorState {
    NotLoaded,
    Loaded,
    Running(u32),
}

impl SupervisorState {
    pub fn is_loaded(&self) -> bool {
        match self {
            SupervisorState::NotLoaded => false,
            _ => true,
        }
    }
}

pub trait ServiceSupervisor {
    /// Load and activate the descriptor at `path`. launchd starts the process right away if RunAtLoad is set.
    fn load(&self, path: &Path) -> Result<(), RegistrationError>;

    /// Stop the process (if running) and unload the service
    fn unload(&self, path: &Path, label: &str) -> Result<(), RegistrationError>;

    fn query(&self, label: &str) -> Result<SupervisorState, RegistrationError>;
}
