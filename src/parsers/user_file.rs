//! Extraction of the files a SANS user file depends on.
//!
//! A user file is a list of `KEY=value` settings. Lines starting with `!` or `#`
//! are comments and lines without `=` are commands, which carry no file
//! references. Keys are case-insensitive.

use std::fs;
use std::path::{Path, PathBuf};

use log::trace;
use nom::bytes::complete::take_while;
use nom::character::complete::char;
use nom::combinator::rest;
use nom::sequence::separated_pair;
use nom::IResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExecutionConfig;
use crate::core::error::FileError;

/// Keys whose values name files, matched exactly.
const FILE_KEYS: [&str; 2] = ["MASKFILE", "TUBECALIBFILE"];

/// Key prefixes whose values name files.
const FILE_KEY_PREFIXES: [&str; 3] = ["MON/DIRECT", "MON/FLAT", "MON/HAB"];

#[derive(Debug, Error)]
pub enum UserFileError {
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error(transparent)]
    File(#[from] FileError),
}

/// One file referenced by a user file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Upper-cased key the file was listed under.
    pub key: String,
    pub file: String,
    pub line: usize,
}

fn setting(i: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_while(|c: char| c != '='), char('='), rest)(i)
}

fn is_file_key(key: &str) -> bool {
    FILE_KEYS.contains(&key) || FILE_KEY_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Every file referenced in `text`, first occurrence only, in file order.
pub fn extract_str(text: &str) -> Result<Vec<Dependency>, UserFileError> {
    let mut dependencies: Vec<Dependency> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
            continue;
        }

        let Ok((_, (key, value))) = setting(line) else {
            trace!("[Command] {line}");
            continue;
        };
        let key = key.trim().to_ascii_uppercase();
        if key.is_empty() {
            return Err(UserFileError::Malformed {
                line: line_no,
                message: format!("setting without a key: '{line}'"),
            });
        }
        if !is_file_key(&key) {
            trace!("[Setting] {key}");
            continue;
        }

        for file in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            if dependencies.iter().any(|d| d.file == file) {
                continue;
            }
            trace!("[  File ] {key} -> {file}");
            dependencies.push(Dependency {
                key: key.clone(),
                file: file.to_string(),
                line: line_no,
            });
        }
    }
    Ok(dependencies)
}

/// Reads and scans `path`. Content errors come back as [`FileError::Malformed`].
pub fn extract_file(path: impl AsRef<Path>) -> Result<Vec<Dependency>, UserFileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| FileError::from_io(path, e))?;
    extract_str(&text).map_err(|e| match e {
        UserFileError::Malformed { line, message } => FileError::malformed(path, line, message).into(),
        other => other,
    })
}

/// Locates every dependency through the configured search directories.
///
/// Stops at the first file that cannot be found or read.
pub fn resolve(dependencies: &[Dependency], config: &ExecutionConfig) -> Result<Vec<PathBuf>, UserFileError> {
    dependencies
        .iter()
        .map(|d| config.resolve_file(&d.file).map_err(UserFileError::from))
        .collect()
}
