use super::{ServiceSupervisor, SupervisorState};
use crate::errors::RegistrationError;
use log::{debug, trace};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum LaunchctlMode {
    /// `bootstrap`/`bootout`/`print` against the gui/<uid> domain
    Bootstrap,
    /// `load -w`/`unload -w`/`list` like `brew services` does on older systems
    Legacy,
}

impl std::str::FromStr for LaunchctlMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bootstrap" => Ok(LaunchctlMode::Bootstrap),
            "legacy" => Ok(LaunchctlMode::Legacy),
            _ => Err(format!(
                "Unknown launchctl mode: {}. Expected bootstrap or legacy",
                s
            )),
        }
    }
}

pub struct Launchctl {
    binary: Option<PathBuf>,
    mode: LaunchctlMode,
    domain: String,
}

impl Launchctl {
    /// `binary` overrides the lookup of `launchctl` in $PATH
    pub fn new(binary: Option<PathBuf>, mode: LaunchctlMode) -> Self {
        Launchctl {
            binary,
            mode,
            domain: format!("gui/{}", nix::unistd::getuid()),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    fn binary(&self) -> Result<PathBuf, RegistrationError> {
        match &self.binary {
            Some(path) => {
                if path.exists() {
                    Ok(path.clone())
                } else {
                    Err(RegistrationError::SupervisorUnavailable(format!(
                        "configured launchctl binary {:?} does not exist",
                        path
                    )))
                }
            }
            None => which::which("launchctl").map_err(|e| {
                RegistrationError::SupervisorUnavailable(format!(
                    "could not find launchctl in $PATH: {}",
                    e
                ))
            }),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(String, Output), RegistrationError> {
        let binary = self.binary()?;
        let binary_str = binary.to_string_lossy();
        let mut words = vec![binary_str.as_ref()];
        words.extend_from_slice(args);
        let cmdline = shlex::try_join(words).unwrap_or_else(|_| args.join(" "));

        trace!("Run supervisor command: {}", cmdline);
        let output = Command::new(&binary)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                // not there anymore or not executable
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    RegistrationError::SupervisorUnavailable(format!(
                        "could not run {:?}: {}",
                        binary, e
                    ))
                }
                _ => RegistrationError::Spawn(cmdline.clone(), e),
            })?;
        trace!("Supervisor command exited with: {}", output.status);
        Ok((cmdline, output))
    }

    /// Run the command and map a non-zero exit to a rejection
    fn run_checked(&self, args: &[&str]) -> Result<Output, RegistrationError> {
        let (cmdline, output) = self.run(args)?;
        if output.status.success() {
            Ok(output)
        } else {
            Err(RegistrationError::Rejected(
                cmdline,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }

    fn service_target(&self, label: &str) -> String {
        format!("{}/{}", self.domain, label)
    }
}

impl ServiceSupervisor for Launchctl {
    fn load(&self, path: &Path) -> Result<(), RegistrationError> {
        let path = path.to_string_lossy();
        match self.mode {
            LaunchctlMode::Bootstrap => self.run_checked(&["bootstrap", self.domain.as_str(), &*path])?,
            LaunchctlMode::Legacy => self.run_checked(&["load", "-w", &*path])?,
        };
        debug!("launchd loaded {}", path);
        Ok(())
    }

    fn unload(&self, path: &Path, label: &str) -> Result<(), RegistrationError> {
        match self.mode {
            LaunchctlMode::Bootstrap => {
                let target = self.service_target(label);
                self.run_checked(&["bootout", target.as_str()])?
            }
            LaunchctlMode::Legacy if path.exists() => {
                let path = path.to_string_lossy();
                self.run_checked(&["unload", "-w", &*path])?
            }
            // the file it was loaded from is gone, only the label is left to address it
            LaunchctlMode::Legacy => self.run_checked(&["remove", label])?,
        };
        debug!("launchd unloaded {}", label);
        Ok(())
    }

    fn query(&self, label: &str) -> Result<SupervisorState, RegistrationError> {
        let (cmdline, output) = match self.mode {
            LaunchctlMode::Bootstrap => {
                let target = self.service_target(label);
                self.run(&["print", target.as_str()])?
            }
            LaunchctlMode::Legacy => self.run(&["list", label])?,
        };
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            if is_service_unknown(output.status.code(), &stderr) {
                return Ok(SupervisorState::NotLoaded);
            }
            return Err(RegistrationError::Rejected(cmdline, output.status.code(), stderr));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(match self.mode {
            LaunchctlMode::Bootstrap => parse_print_output(&stdout),
            LaunchctlMode::Legacy => parse_list_output(&stdout),
        })
    }
}

/// launchctl exits with 113 when the label is not loaded in the domain. Older releases exit 1 for `list <label>`
/// but still say so on stderr.
const EXIT_SERVICE_NOT_FOUND: i32 = 113;

fn is_service_unknown(code: Option<i32>, stderr: &str) -> bool {
    code == Some(EXIT_SERVICE_NOT_FOUND) || stderr.contains("Could not find service")
}

/// Interpret the output of `launchctl print gui/<uid>/<label>` for a loaded service
pub fn parse_print_output(output: &str) -> SupervisorState {
    for line in output.lines() {
        let line = line.trim();
        if let Some(pid) = line.strip_prefix("pid = ") {
            if let Ok(pid) = pid.trim().parse::<u32>() {
                return SupervisorState::Running(pid);
            }
        }
    }
    SupervisorState::Loaded
}

/// Interpret the output of `launchctl list <label>` for a loaded service
pub fn parse_list_output(output: &str) -> SupervisorState {
    for line in output.lines() {
        let line = line.trim();
        if let Some(pid) = line.strip_prefix("\"PID\" = ") {
            if let Ok(pid) = pid.trim_end_matches(';').trim().parse::<u32>() {
                return SupervisorState::Running(pid);
            }
        }
    }
    SupervisorState::Loaded
}
