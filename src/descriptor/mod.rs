//! The service descriptor: what launchd needs to know to supervise a background process, and the
//! conversion from/to the xml property list format launchd reads from ~/Library/LaunchAgents.

mod plist_parser;
mod plist_writer;

pub use plist_parser::*;
pub use plist_writer::*;

use crate::errors::ValidationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_LABEL: &str = "homebrew.mxcl.wechat-backup";
pub const DEFAULT_PROGRAM_NAME: &str = "wechat-backup";
pub const DEFAULT_HOMEBREW_PREFIX: &str = "/usr/local";
pub const DEFAULT_LOG_PATH: &str = "/tmp/wechat-backup.log";
pub const SERVICE_FLAG: &str = "--service";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub label: String,
    pub program_path: PathBuf,
    pub arguments: Vec<String>,
    pub run_at_load: bool,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,

    #[serde(default)]
    pub keep_alive: bool,
    #[serde(default)]
    pub working_directory: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl ServiceDescriptor {
    /// The descriptor the homebrew formula writes: run the installed binary in service mode at login and
    /// capture both output streams into one log file.
    pub fn homebrew_default(prefix: &Path) -> ServiceDescriptor {
        ServiceDescriptor {
            label: DEFAULT_LABEL.to_owned(),
            program_path: prefix
                .join("opt")
                .join(DEFAULT_PROGRAM_NAME)
                .join("bin")
                .join(DEFAULT_PROGRAM_NAME),
            arguments: vec![SERVICE_FLAG.to_owned()],
            run_at_load: true,
            stdout_path: PathBuf::from(DEFAULT_LOG_PATH),
            stderr_path: PathBuf::from(DEFAULT_LOG_PATH),
            keep_alive: false,
            working_directory: None,
            environment: BTreeMap::new(),
        }
    }

    /// The full argv launchd will use, program path first
    pub fn program_arguments(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.arguments.len() + 1);
        argv.push(self.program_path.to_string_lossy().into_owned());
        argv.extend(self.arguments.iter().cloned());
        argv
    }

    /// The file name launchd expects for this descriptor
    pub fn file_name(&self) -> String {
        format!("{}.plist", self.label)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_label(&self.label)?;
        validate_absolute("programPath", &self.program_path)?;
        validate_absolute("stdoutPath", &self.stdout_path)?;
        validate_absolute("stderrPath", &self.stderr_path)?;
        if let Some(dir) = &self.working_directory {
            validate_absolute("workingDirectory", dir)?;
        }
        for arg in &self.arguments {
            validate_text("arguments", arg)?;
        }
        for (key, value) in &self.environment {
            if key.is_empty() || key.contains('=') || key.chars().any(|c| c.is_control()) {
                return Err(ValidationError::InvalidEnvironmentKey(key.clone()));
            }
            validate_text("environment", value)?;
        }
        Ok(())
    }
}

pub fn validate_label(label: &str) -> Result<(), ValidationError> {
    if label.is_empty() {
        return Err(ValidationError::EmptyLabel);
    }
    let segment_ok = |segment: &str| {
        !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    };
    if !label.split('.').all(segment_ok) {
        return Err(ValidationError::InvalidLabel(label.to_owned()));
    }
    Ok(())
}

/// XML 1.0 can not carry NUL or the C0 controls apart from tab, newline and carriage return
fn validate_text(field: &'static str, text: &str) -> Result<(), ValidationError> {
    for c in text.chars() {
        match c {
            '\0' => return Err(ValidationError::NulByte(field)),
            '\t' | '\n' | '\r' => {}
            c if c < ' ' => return Err(ValidationError::ControlCharacter(field, c)),
            _ => {}
        }
    }
    Ok(())
}

fn validate_absolute(field: &'static str, path: &Path) -> Result<(), ValidationError> {
    let as_str = path.to_string_lossy();
    if as_str.is_empty() {
        return Err(ValidationError::EmptyPath(field));
    }
    validate_text(field, &as_str)?;
    if !path.is_absolute() {
        return Err(ValidationError::RelativePath(field, path.to_path_buf()));
    }
    Ok(())
}

/// The hint the homebrew formula prints after installation
pub fn caveats(descr: &ServiceDescriptor) -> String {
    let name = descr
        .program_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| descr.label.clone());
    format!(
        "To have launchd start {name} now and restart at login:\n  launchsd install\nOr, when installed through homebrew:\n  brew services start {name}\nOr, if you don't want/need a background service you can just run:\n  {program}\n",
        name = name,
        program = descr.program_path.display(),
    )
}
