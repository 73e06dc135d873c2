//! Ambient state the manager depends on: where the user's home is and how to talk to the service supervisor.

use crate::errors::{FileSystemAction, FileSystemError};
use crate::supervisor::{Launchctl, LaunchctlMode, ServiceSupervisor};
use std::path::PathBuf;

pub trait Environment {
    fn home_dir(&self) -> Result<PathBuf, FileSystemError>;
    fn supervisor(&self) -> &dyn ServiceSupervisor;
}

/// The real user session: $HOME (or the passwd entry) and launchctl
pub struct SystemEnvironment {
    supervisor: Launchctl,
}

impl SystemEnvironment {
    pub fn new(launchctl_path: Option<PathBuf>, mode: LaunchctlMode) -> Self {
        SystemEnvironment {
            supervisor: Launchctl::new(launchctl_path, mode),
        }
    }

    pub fn launchctl(&self) -> &Launchctl {
        &self.supervisor
    }
}

impl Environment for SystemEnvironment {
    fn home_dir(&self) -> Result<PathBuf, FileSystemError> {
        if let Some(home) = std::env::var_os("HOME") {
            if !home.is_empty() {
                return Ok(PathBuf::from(home));
            }
        }

        let uid = nix::unistd::getuid();
        match nix::unistd::User::from_uid(uid) {
            Ok(Some(user)) => Ok(user.dir),
            Ok(None) => Err(FileSystemError::new(
                FileSystemAction::ResolveHome,
                PathBuf::from("~"),
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("$HOME is not set and uid {} has no passwd entry", uid),
                ),
            )),
            Err(e) => Err(FileSystemError::new(
                FileSystemAction::ResolveHome,
                PathBuf::from("~"),
                std::io::Error::from(e),
            )),
        }
    }

    fn supervisor(&self) -> &dyn ServiceSupervisor {
        &self.supervisor
    }
}
