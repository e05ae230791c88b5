use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::validation::ValidationResult;
use crate::workspace::WorkspaceError;

/// Structural errors raised by a [`PropertySchema`](crate::core::property::PropertySchema).
///
/// These indicate a caller or programmer defect and are never recovered locally.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Property '{0}' is already declared")]
    Duplicate(String),

    #[error("Unknown property '{0}'")]
    Unknown(String),

    #[error("Property '{0}' has no value and no default")]
    Unbound(String),

    #[error("Property '{name}' expects {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid value for property '{name}': {message}")]
    Validator { name: String, message: String },

    #[error("Output property '{0}' was already set during this execution")]
    OutputAlreadySet(String),
}

/// The cause of a single pipeline step failing.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("missing argument '{0}'")]
    MissingArgument(String),

    #[error("argument '{name}' expects {expected}")]
    WrongArgumentType { name: String, expected: &'static str },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("child algorithm failed: {0}")]
    Child(#[from] Box<AlgorithmError>),

    #[error("{0}")]
    Domain(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Failed(String),
}

/// Errors raised while assembling or running a
/// [`ChildPipelineRunner`](crate::core::sync_impl::pipeline::ChildPipelineRunner).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Step '{step}' references '{reference}', which no earlier step produces")]
    InvalidStepOrder { step: String, reference: String },

    #[error("Step '{step}' binds output '{binding}', which an earlier step already produces")]
    DuplicateBinding { step: String, binding: String },

    #[error("Pipeline cannot be modified or restarted in state {state}")]
    NotRestartable { state: String },

    #[error("Step '{step}' (#{index}) failed: {cause}")]
    StepFailed {
        step: String,
        index: usize,
        #[source]
        cause: StepError,
    },

    #[error(transparent)]
    Progress(#[from] ProgressError),
}

impl PipelineError {
    /// Name of the failing step, if this error came from one.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            PipelineError::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Pipeline/schema mismatches found while binding results. Always a defect.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Output property '{0}' has no corresponding pipeline result")]
    MissingOutput(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("Progress reported more than {total} times")]
    Overflow { total: usize },

    #[error("Cannot reset progress mid-run ({current}/{total})")]
    ResetWhileRunning { current: usize, total: usize },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Algorithm '{name}' version {version} is already registered")]
    Duplicate { name: String, version: u32 },

    #[error("Algorithm '{name}'{} is not registered", .version.map(|v| format!(" version {v}")).unwrap_or_default())]
    Unknown { name: String, version: Option<u32> },

    #[error("Algorithm '{name}' failed to initialize: {source}")]
    Initialize {
        name: String,
        #[source]
        source: SchemaError,
    },
}

/// File access errors, kept apart so callers can tell a missing file from a
/// malformed one or one they may not read.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("File not found: {}", .path.display())]
    NotFound { path: PathBuf },

    #[error("Permission denied: {}", .path.display())]
    PermissionDenied { path: PathBuf },

    #[error("Malformed content in {} at line {line}: {message}", .path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FileError {
    /// Classifies an I/O error raised while accessing `path`.
    pub fn from_io(path: impl AsRef<Path>, source: io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            io::ErrorKind::NotFound => FileError::NotFound { path },
            io::ErrorKind::PermissionDenied => FileError::PermissionDenied { path },
            _ => FileError::Io { path, source },
        }
    }

    pub fn malformed(path: impl AsRef<Path>, line: usize, message: impl Into<String>) -> Self {
        FileError::Malformed {
            path: path.as_ref().to_path_buf(),
            line,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Search directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error(transparent)]
    File(#[from] FileError),

    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything an algorithm execution can fail with.
#[derive(Debug, Error)]
pub enum AlgorithmError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Some invalid properties found: {0}")]
    Invalid(ValidationResult),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Binding(#[from] BindError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("Execution of '{algorithm}' panicked: {message}")]
    Panicked { algorithm: String, message: String },
}

impl AlgorithmError {
    /// A validation failure on a single field, for problems only found while
    /// building the pipeline.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut result = ValidationResult::new();
        result.add_error(field, message);
        AlgorithmError::Invalid(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_error_classifies_io_kinds() {
        let missing = FileError::from_io("a.txt", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(missing, FileError::NotFound { .. }));

        let denied = FileError::from_io("a.txt", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, FileError::PermissionDenied { .. }));

        let other = FileError::from_io("a.txt", io::Error::other("disk on fire"));
        assert!(matches!(other, FileError::Io { .. }));
    }

    #[test]
    fn test_unknown_algorithm_message_mentions_version() {
        let err = RegistryError::Unknown {
            name: "Rebin".to_string(),
            version: Some(3),
        };
        assert_eq!(err.to_string(), "Algorithm 'Rebin' version 3 is not registered");

        let err = RegistryError::Unknown {
            name: "Rebin".to_string(),
            version: None,
        };
        assert_eq!(err.to_string(), "Algorithm 'Rebin' is not registered");
    }
}
