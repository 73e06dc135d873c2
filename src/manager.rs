//! Install, register and remove a service descriptor.
//!
//! A descriptor moves through these states:
//! `Unregistered -> Installed (file written) -> Registered (loaded by launchd) -> Running -> Unregistered`
//!
//! All operations are synchronous one-shot administrative actions. Nothing is retried, a failing step is reported
//! to the caller right away.

use crate::descriptor::{self, ServiceDescriptor};
use crate::environment::Environment;
use crate::errors::*;
use crate::supervisor::SupervisorState;
use log::{debug, info, trace, warn};
use std::path::{Path, PathBuf};

const LAUNCH_AGENTS_DIR: &str = "Library/LaunchAgents";

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum ServiceState {
    Unregistered,
    Installed,
    Registered,
    Running(u32),
}

impl std::fmt::Display for ServiceState {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ServiceState::Unregistered => write!(f, "unregistered"),
            ServiceState::Installed => write!(f, "installed (not loaded)"),
            ServiceState::Registered => write!(f, "registered (not running)"),
            ServiceState::Running(pid) => write!(f, "running (pid {})", pid),
        }
    }
}

pub struct ServiceDescriptorManager<E: Environment> {
    env: E,
    agents_dir: Option<PathBuf>,
}

impl<E: Environment> ServiceDescriptorManager<E> {
    pub fn new(env: E) -> Self {
        ServiceDescriptorManager {
            env,
            agents_dir: None,
        }
    }

    /// Put descriptors somewhere else than ~/Library/LaunchAgents
    pub fn with_agents_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.agents_dir = dir;
        self
    }

    pub fn environment(&self) -> &E {
        &self.env
    }

    pub fn agents_dir(&self) -> Result<PathBuf, FileSystemError> {
        match &self.agents_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.env.home_dir()?.join(LAUNCH_AGENTS_DIR)),
        }
    }

    /// Where the descriptor for `label` lives if no explicit destination is given
    pub fn default_destination(&self, label: &str) -> Result<PathBuf, ServiceError> {
        descriptor::validate_label(label)?;
        Ok(self.agents_dir()?.join(format!("{}.plist", label)))
    }

    pub fn generate(&self, descr: &ServiceDescriptor) -> Result<String, ValidationError> {
        descriptor::generate(descr)
    }

    /// Write the document to `destination`, creating the parent directories as needed. An existing file is
    /// replaced as a whole.
    pub fn install(&self, document: &str, destination: &Path) -> Result<(), FileSystemError> {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    FileSystemError::new(FileSystemAction::CreateDir, parent.to_path_buf(), e)
                })?;
            }
        }

        // write next to the destination and move it in place so the file is never seen half written
        let mut tmp_name = destination.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);
        std::fs::write(&tmp_path, document.as_bytes())
            .map_err(|e| FileSystemError::new(FileSystemAction::Write, tmp_path.clone(), e))?;
        if let Err(e) = std::fs::rename(&tmp_path, destination) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(FileSystemError::new(
                FileSystemAction::Write,
                destination.to_path_buf(),
                e,
            ));
        }

        info!("Installed service descriptor at {:?}", destination);
        Ok(())
    }

    /// Hand the descriptor at `destination` to the supervisor. Fails if a service with the same label is already
    /// loaded.
    pub fn register(&self, destination: &Path) -> Result<(), ServiceError> {
        let descr = self.read_descriptor(destination)?;
        let supervisor = self.env.supervisor();

        if supervisor.query(&descr.label)?.is_loaded() {
            return Err(RegistrationError::AlreadyRegistered(descr.label).into());
        }
        supervisor.load(destination)?;

        info!("Registered service {}", descr.label);
        Ok(())
    }

    /// Stop and unload the service described at `destination`, then delete the file.
    ///
    /// Unregistering something that is not there is not an error: a missing file and a service unknown to the
    /// supervisor both count as already unregistered.
    pub fn unregister(&self, destination: &Path) -> Result<(), ServiceError> {
        if !destination.exists() {
            debug!(
                "No descriptor at {:?}, nothing to unregister",
                destination
            );
            return Ok(());
        }

        let label = match self.read_descriptor(destination) {
            Ok(descr) => descr.label,
            Err(ServiceError::Registration(RegistrationError::MalformedDescriptor(_, e))) => {
                // launchd names the files after the label, use that to still get rid of the service
                let label = label_from_file_name(destination).ok_or_else(|| {
                    RegistrationError::MalformedDescriptor(destination.to_path_buf(), e.clone())
                })?;
                warn!(
                    "Descriptor {:?} is malformed ({}). Unregister by file name as {}",
                    destination, e, label
                );
                label
            }
            Err(e) => return Err(e),
        };

        let supervisor = self.env.supervisor();
        match supervisor.query(&label)? {
            SupervisorState::NotLoaded => {
                debug!("Service {} is not loaded, only remove the descriptor", label);
            }
            state => {
                trace!("Service {} is {:?}, unload it", label, state);
                supervisor.unload(destination, &label)?;
            }
        }

        match std::fs::remove_file(destination) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(FileSystemError::new(
                    FileSystemAction::Remove,
                    destination.to_path_buf(),
                    e,
                )
                .into())
            }
        }

        info!("Unregistered service {}", label);
        Ok(())
    }

    pub fn status(&self, destination: &Path) -> Result<ServiceState, ServiceError> {
        if !destination.exists() {
            return Ok(ServiceState::Unregistered);
        }
        let descr = self.read_descriptor(destination)?;
        let state = match self.env.supervisor().query(&descr.label)? {
            SupervisorState::NotLoaded => ServiceState::Installed,
            SupervisorState::Loaded => ServiceState::Registered,
            SupervisorState::Running(pid) => ServiceState::Running(pid),
        };
        Ok(state)
    }

    /// The complete install flow: generate, replace any previous instance, write and register.
    /// Returns where the descriptor was written.
    pub fn install_service(
        &self,
        descr: &ServiceDescriptor,
        destination: Option<&Path>,
    ) -> Result<PathBuf, ServiceError> {
        let document = self.generate(descr)?;
        let destination = match destination {
            Some(dest) => dest.to_path_buf(),
            None => self.default_destination(&descr.label)?,
        };

        // same label may still be loaded from the previous install
        self.unregister(&destination)?;
        let supervisor = self.env.supervisor();
        if supervisor.query(&descr.label)?.is_loaded() {
            debug!(
                "Service {} is still loaded from somewhere else, unload it",
                descr.label
            );
            supervisor.unload(&destination, &descr.label)?;
        }

        self.install(&document, &destination)?;
        self.register(&destination)?;
        Ok(destination)
    }

    pub fn uninstall_service(
        &self,
        label: &str,
        destination: Option<&Path>,
    ) -> Result<PathBuf, ServiceError> {
        let destination = match destination {
            Some(dest) => dest.to_path_buf(),
            None => self.default_destination(label)?,
        };
        self.unregister(&destination)?;
        Ok(destination)
    }

    pub fn read_descriptor(&self, path: &Path) -> Result<ServiceDescriptor, ServiceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FileSystemError::new(FileSystemAction::Read, path.to_path_buf(), e))?;
        descriptor::parse(&content).map_err(|e| {
            ServiceError::Registration(RegistrationError::MalformedDescriptor(path.to_path_buf(), e))
        })
    }
}

fn label_from_file_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let label = name.strip_suffix(".plist")?;
    descriptor::validate_label(label).ok()?;
    Some(label.to_owned())
}
