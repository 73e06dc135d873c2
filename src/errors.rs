//! Error types for the descriptor lifecycle.
//!
//! Every failure is one of three categories: the descriptor itself is invalid, the filesystem refused an
//! operation, or the service supervisor refused (or could not be asked) to load/unload the service.
//! `ServiceError` wraps the three so callers can map them to distinct exit codes.

use std::path::PathBuf;

/// sysexits(3) values used by the cli for the different failure categories
pub const EXIT_VALIDATION: i32 = 65;
pub const EXIT_REGISTRATION: i32 = 69;
pub const EXIT_FILESYSTEM: i32 = 74;
pub const EXIT_CONFIG: i32 = 78;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyLabel,
    InvalidLabel(String),
    RelativePath(&'static str, PathBuf),
    EmptyPath(&'static str),
    NulByte(&'static str),
    ControlCharacter(&'static str, char),
    InvalidEnvironmentKey(String),
    EmptyProgramArguments,
    MissingKey(&'static str),
    UnknownKey(String),
    DuplicateKey(String),
    WrongType(String, &'static str),
    Malformed(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ValidationError::EmptyLabel => write!(f, "the label must not be empty"),
            ValidationError::InvalidLabel(label) => write!(
                f,
                "label {:?} is not a reverse-DNS style identifier (dot separated segments of [A-Za-z0-9_-])",
                label
            ),
            ValidationError::RelativePath(field, path) => {
                write!(f, "{} must be an absolute path but was: {:?}", field, path)
            }
            ValidationError::EmptyPath(field) => write!(f, "{} must not be empty", field),
            ValidationError::NulByte(field) => write!(f, "{} contains a NUL byte", field),
            ValidationError::ControlCharacter(field, c) => write!(
                f,
                "{} contains the control character U+{:04X} which a property list cannot hold",
                field, *c as u32
            ),
            ValidationError::InvalidEnvironmentKey(key) => {
                write!(f, "environment variable name {:?} is invalid", key)
            }
            ValidationError::EmptyProgramArguments => {
                write!(f, "ProgramArguments must contain at least the program path")
            }
            ValidationError::MissingKey(key) => write!(f, "required key {} is missing", key),
            ValidationError::UnknownKey(key) => write!(f, "key {} is not supported", key),
            ValidationError::DuplicateKey(key) => write!(f, "key {} occured multiple times", key),
            ValidationError::WrongType(key, expected) => {
                write!(f, "key {} should hold a value of type {}", key, expected)
            }
            ValidationError::Malformed(msg) => write!(f, "malformed property list: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystemAction {
    ResolveHome,
    CreateDir,
    Write,
    Read,
    Remove,
}

impl std::fmt::Display for FileSystemAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            FileSystemAction::ResolveHome => "resolving the home directory",
            FileSystemAction::CreateDir => "creating directory",
            FileSystemAction::Write => "writing descriptor",
            FileSystemAction::Read => "reading descriptor",
            FileSystemAction::Remove => "removing descriptor",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug)]
pub struct FileSystemError {
    pub action: FileSystemAction,
    pub path: PathBuf,
    source: std::io::Error,
}

impl FileSystemError {
    pub fn new(action: FileSystemAction, path: PathBuf, source: std::io::Error) -> Self {
        FileSystemError {
            action,
            path,
            source,
        }
    }

    pub fn kind(&self) -> std::io::ErrorKind {
        self.source.kind()
    }
}

impl std::fmt::Display for FileSystemError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Error while {} {:?}: {}", self.action, self.path, self.source)
    }
}

impl std::error::Error for FileSystemError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug)]
pub enum RegistrationError {
    /// The supervisor binary could not be found or is not usable
    SupervisorUnavailable(String),
    /// Spawning the supervisor command failed
    Spawn(String, std::io::Error),
    /// The supervisor ran but refused the request: (commandline, exit code, stderr)
    Rejected(String, Option<i32>, String),
    /// A service with this label is already loaded
    AlreadyRegistered(String),
    /// The descriptor on disk could not be understood
    MalformedDescriptor(PathBuf, ValidationError),
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RegistrationError::SupervisorUnavailable(reason) => {
                write!(f, "Service supervisor is unavailable: {}", reason)
            }
            RegistrationError::Spawn(cmd, e) => {
                write!(f, "Could not run supervisor command `{}`: {}", cmd, e)
            }
            RegistrationError::Rejected(cmd, code, stderr) => {
                match code {
                    Some(code) => write!(f, "Supervisor command `{}` failed with exit code {}", cmd, code)?,
                    None => write!(f, "Supervisor command `{}` was killed by a signal", cmd)?,
                }
                let stderr = stderr.trim();
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            RegistrationError::AlreadyRegistered(label) => write!(
                f,
                "A service with label {} is already registered. Unregister it first",
                label
            ),
            RegistrationError::MalformedDescriptor(path, e) => {
                write!(f, "Descriptor {:?} was rejected: {}", path, e)
            }
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Spawn(_, e) => Some(e),
            RegistrationError::MalformedDescriptor(_, e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum ServiceError {
    Validation(ValidationError),
    FileSystem(FileSystemError),
    Registration(RegistrationError),
}

impl ServiceError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ServiceError::Validation(_) => EXIT_VALIDATION,
            ServiceError::FileSystem(_) => EXIT_FILESYSTEM,
            ServiceError::Registration(_) => EXIT_REGISTRATION,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ServiceError::Validation(e) => write!(f, "Invalid service descriptor: {}", e),
            ServiceError::FileSystem(e) => write!(f, "{}", e),
            ServiceError::Registration(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Validation(e) => Some(e),
            ServiceError::FileSystem(e) => Some(e),
            ServiceError::Registration(e) => Some(e),
        }
    }
}

impl std::convert::From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::Validation(err)
    }
}

impl std::convert::From<FileSystemError> for ServiceError {
    fn from(err: FileSystemError) -> Self {
        ServiceError::FileSystem(err)
    }
}

impl std::convert::From<RegistrationError> for ServiceError {
    fn from(err: RegistrationError) -> Self {
        ServiceError::Registration(err)
    }
}
