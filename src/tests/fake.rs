//! In-memory stand-in for launchd so the lifecycle can be tested without a user session

use crate::environment::Environment;
use crate::errors::{FileSystemError, RegistrationError};
use crate::supervisor::{ServiceSupervisor, SupervisorState};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeSupervisor {
    pub loaded: Mutex<HashMap<String, SupervisorState>>,
    pub calls: Mutex<Vec<String>>,
    pub reject_loads: Mutex<Option<String>>,
    pub unavailable: Mutex<bool>,
    next_pid: Mutex<u32>,
}

impl FakeSupervisor {
    pub fn state_of(&self, label: &str) -> SupervisorState {
        self.loaded
            .lock()
            .unwrap()
            .get(label)
            .copied()
            .unwrap_or(SupervisorState::NotLoaded)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn check_available(&self) -> Result<(), RegistrationError> {
        if *self.unavailable.lock().unwrap() {
            Err(RegistrationError::SupervisorUnavailable(
                "fake supervisor switched off".into(),
            ))
        } else {
            Ok(())
        }
    }
}

impl ServiceSupervisor for FakeSupervisor {
    fn load(&self, path: &Path) -> Result<(), RegistrationError> {
        self.check_available()?;
        self.calls.lock().unwrap().push(format!("load {}", path.display()));

        if let Some(reason) = &*self.reject_loads.lock().unwrap() {
            return Err(RegistrationError::Rejected(
                format!("fake load {}", path.display()),
                Some(5),
                reason.clone(),
            ));
        }

        // launchd reads the file itself, so does the fake
        let content = std::fs::read_to_string(path).map_err(|e| {
            RegistrationError::Rejected(format!("fake load {}", path.display()), Some(2), e.to_string())
        })?;
        let descr = crate::descriptor::parse(&content)
            .map_err(|e| RegistrationError::MalformedDescriptor(path.to_path_buf(), e))?;

        let mut loaded = self.loaded.lock().unwrap();
        if loaded.contains_key(&descr.label) {
            return Err(RegistrationError::Rejected(
                format!("fake load {}", path.display()),
                Some(37),
                "service already loaded".into(),
            ));
        }
        let state = if descr.run_at_load {
            let mut pid = self.next_pid.lock().unwrap();
            *pid += 1;
            SupervisorState::Running(1000 + *pid)
        } else {
            SupervisorState::Loaded
        };
        loaded.insert(descr.label, state);
        Ok(())
    }

    fn unload(&self, _path: &Path, label: &str) -> Result<(), RegistrationError> {
        self.check_available()?;
        self.calls.lock().unwrap().push(format!("unload {}", label));

        match self.loaded.lock().unwrap().remove(label) {
            Some(_) => Ok(()),
            None => Err(RegistrationError::Rejected(
                format!("fake unload {}", label),
                Some(113),
                "Could not find service in domain".into(),
            )),
        }
    }

    fn query(&self, label: &str) -> Result<SupervisorState, RegistrationError> {
        self.check_available()?;
        Ok(self.state_of(label))
    }
}

pub struct FakeEnvironment {
    pub home: PathBuf,
    pub supervisor: FakeSupervisor,
}

impl FakeEnvironment {
    pub fn new(home: &Path) -> Self {
        FakeEnvironment {
            home: home.to_path_buf(),
            supervisor: FakeSupervisor::default(),
        }
    }
}

impl Environment for FakeEnvironment {
    fn home_dir(&self) -> Result<PathBuf, FileSystemError> {
        Ok(self.home.clone())
    }

    fn supervisor(&self) -> &dyn ServiceSupervisor {
        &self.supervisor
    }
}
