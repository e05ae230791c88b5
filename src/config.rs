//! Per-run configuration.
//!
//! There is no global configuration: an [`ExecutionConfig`] travels inside the
//! [`ExecutionContext`](crate::ExecutionContext) of every execution.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::error::{ConfigError, FileError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Directories searched, in order, for relative file names.
    pub search_directories: Vec<PathBuf>,
    /// File that receives one JSON history record per execution.
    pub script_log: Option<PathBuf>,
    /// Also write progress events to the log.
    pub log_progress: bool,
    /// Record history for child algorithms, not just top-level ones.
    pub record_child_history: bool,
    /// Discard intermediate pipeline results once a run ends.
    pub cleanup_intermediates: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            search_directories: Vec::new(),
            script_log: None,
            log_progress: false,
            record_child_history: false,
            cleanup_intermediates: true,
        }
    }
}

impl ExecutionConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| FileError::from_io(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn with_search_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_directories.push(dir.into());
        self
    }

    pub fn with_script_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_log = Some(path.into());
        self
    }

    pub fn with_log_progress(mut self, enabled: bool) -> Self {
        self.log_progress = enabled;
        self
    }

    pub fn with_child_history(mut self, enabled: bool) -> Self {
        self.record_child_history = enabled;
        self
    }

    pub fn with_cleanup_intermediates(mut self, enabled: bool) -> Self {
        self.cleanup_intermediates = enabled;
        self
    }

    /// Every search directory must exist.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.search_directories.iter().find(|d| !d.is_dir()) {
            Some(dir) => Err(ConfigError::MissingDirectory(dir.clone())),
            None => Ok(()),
        }
    }

    /// Finds `name` as given, then in each search directory.
    ///
    /// A candidate that exists but cannot be read is reported as such rather than
    /// skipped.
    pub fn resolve_file(&self, name: &str) -> Result<PathBuf, FileError> {
        let given = Path::new(name);
        let candidates = std::iter::once(given.to_path_buf()).chain(
            self.search_directories
                .iter()
                .filter(|_| given.is_relative())
                .map(|dir| dir.join(given)),
        );

        for candidate in candidates {
            match fs::metadata(&candidate) {
                Ok(meta) if meta.is_file() => {
                    fs::File::open(&candidate).map_err(|e| FileError::from_io(&candidate, e))?;
                    log::trace!("resolved '{name}' to {}", candidate.display());
                    return Ok(candidate);
                }
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(FileError::from_io(&candidate, e)),
            }
        }
        Err(FileError::NotFound {
            path: given.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_partial_json() {
        let config = ExecutionConfig::from_json_str(r#"{ "log_progress": true }"#).unwrap();
        assert!(config.log_progress);
        assert!(config.cleanup_intermediates);
        assert!(config.search_directories.is_empty());

        assert!(matches!(
            ExecutionConfig::from_json_str("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_directory_is_a_config_error() {
        let config = ExecutionConfig::default().with_search_directory("/definitely/not/here");
        assert!(matches!(config.validate(), Err(ConfigError::MissingDirectory(_))));
    }

    #[test]
    fn test_resolve_file_through_search_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mask.xml"), "<mask/>").unwrap();

        let config = ExecutionConfig::default().with_search_directory(dir.path());
        config.validate().unwrap();
        assert_eq!(config.resolve_file("mask.xml").unwrap(), dir.path().join("mask.xml"));
        assert!(matches!(
            config.resolve_file("other.xml"),
            Err(FileError::NotFound { .. })
        ));
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = ExecutionConfig::from_json_file("/no/such/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::File(FileError::NotFound { .. })));
    }
}
