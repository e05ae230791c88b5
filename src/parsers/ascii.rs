//! Plain-text workspace files.
//!
//! Each spectrum is a block of `X Y E` rows (whitespace or comma separated) and
//! blocks are separated by a blank line. A histogram block ends with a row that
//! holds only its last bin edge. Lines starting with `#` are comments, except
//! `# Unit: <name>`, which sets the workspace unit.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::trace;
use nom::bytes::complete::tag_no_case;
use nom::character::complete::{char, space0};
use nom::combinator::rest;
use nom::sequence::{preceded, tuple};
use nom::IResult;

use super::numbers;
use crate::core::error::FileError;
use crate::workspace::{Spectrum, Workspace};

fn unit_header(i: &str) -> IResult<&str, &str> {
    preceded(
        tuple((char('#'), space0, tag_no_case("unit"), space0, char(':'), space0)),
        rest,
    )(i)
}

#[derive(Default)]
struct Block {
    x: Vec<f64>,
    y: Vec<f64>,
    e: Vec<f64>,
    closed: bool,
    first_line: usize,
}

impl Block {
    fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    fn into_spectrum(self, path: &Path) -> Result<Spectrum, FileError> {
        let first_line = self.first_line;
        Spectrum::new(self.x, self.y, self.e)
            .map_err(|e| FileError::malformed(path, first_line, e.to_string()))
    }
}

/// Parses workspace text. `path` only labels errors.
pub fn parse_str(text: &str, path: &Path) -> Result<Workspace, FileError> {
    let mut unit = String::new();
    let mut spectra = Vec::new();
    let mut block = Block::default();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.is_empty() {
            if !block.is_empty() {
                spectra.push(std::mem::take(&mut block).into_spectrum(path)?);
            }
            continue;
        }
        if line.starts_with('#') {
            if let Ok((_, name)) = unit_header(line) {
                unit = name.trim().to_string();
            }
            trace!("[Comment] {line}");
            continue;
        }

        if block.closed {
            return Err(FileError::malformed(
                path,
                line_no,
                "data after the closing bin edge of a histogram",
            ));
        }
        let (_, values) = numbers(line)
            .map_err(|_| FileError::malformed(path, line_no, format!("not a row of numbers: '{line}'")))?;
        if block.is_empty() {
            block.first_line = line_no;
        }
        match values[..] {
            [x, y, e] => {
                block.x.push(x);
                block.y.push(y);
                block.e.push(e);
            }
            [x, y] => {
                block.x.push(x);
                block.y.push(y);
                block.e.push(y.abs().sqrt());
            }
            [x] => {
                block.x.push(x);
                block.closed = true;
            }
            _ => {
                return Err(FileError::malformed(
                    path,
                    line_no,
                    format!("expected 1 to 3 columns, got {}", values.len()),
                ));
            }
        }
    }
    if !block.is_empty() {
        spectra.push(block.into_spectrum(path)?);
    }

    Ok(Workspace::new(spectra).with_unit(unit))
}

pub fn read_workspace(path: impl AsRef<Path>) -> Result<Workspace, FileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| FileError::from_io(path, e))?;
    parse_str(&text, path)
}

/// Formats `workspace` in the layout [`parse_str`] reads.
pub fn format_workspace(workspace: &Workspace, precision: usize) -> String {
    let mut out = String::new();
    if !workspace.unit().is_empty() {
        let _ = writeln!(out, "# Unit: {}", workspace.unit());
    }
    let _ = writeln!(out, "# X Y E");

    for (i, spectrum) in workspace.spectra().iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        for ((x, y), e) in spectrum.x().iter().zip(spectrum.y()).zip(spectrum.e()) {
            let _ = writeln!(out, "{x:.precision$} {y:.precision$} {e:.precision$}");
        }
        if spectrum.is_histogram() {
            if let Some(last) = spectrum.x().last() {
                let _ = writeln!(out, "{last:.precision$}");
            }
        }
    }
    out
}

pub fn write_workspace(workspace: &Workspace, path: impl AsRef<Path>, precision: usize) -> Result<(), FileError> {
    let path = path.as_ref();
    fs::write(path, format_workspace(workspace, precision)).map_err(|e| FileError::from_io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_points_and_histogram() {
        let text = "# Unit: TOF\n# X Y E\n1 10 1\n2 20 2\n\n0, 4, 2\n1, 9, 3\n2\n";
        let ws = parse_str(text, Path::new("inline")).unwrap();

        assert_eq!(ws.unit(), "TOF");
        assert_eq!(ws.spectrum_count(), 2);
        assert!(!ws.spectrum(0).unwrap().is_histogram());
        let hist = ws.spectrum(1).unwrap();
        assert!(hist.is_histogram());
        assert_eq!(hist.x(), &[0.0, 1.0, 2.0]);
        assert_eq!(hist.e(), &[2.0, 3.0]);
    }

    #[test]
    fn test_two_columns_get_poisson_errors() {
        let ws = parse_str("1 4\n2 9\n", Path::new("inline")).unwrap();
        assert_eq!(ws.spectrum(0).unwrap().e(), &[2.0, 3.0]);
    }

    #[test]
    fn test_malformed_rows_report_their_line() {
        let err = parse_str("1 1 1\n2 x 1\n", Path::new("bad.txt")).unwrap_err();
        assert!(matches!(err, FileError::Malformed { line: 2, .. }));

        let err = parse_str("0 1 1\n1\n2 1 1\n", Path::new("bad.txt")).unwrap_err();
        assert!(matches!(err, FileError::Malformed { line: 3, .. }));

        let err = parse_str("1 2 3 4\n", Path::new("bad.txt")).unwrap_err();
        assert!(err.to_string().contains("bad.txt"));
    }

    #[test]
    fn test_write_then_read_file() {
        let spectrum = Spectrum::histogram(vec![0.0, 0.5, 1.0], vec![3.0, 4.0], vec![1.5, 2.0]).unwrap();
        let ws = Workspace::new(vec![spectrum.clone(), spectrum]).with_unit("Wavelength");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_workspace(&ws, &path, 6).unwrap();

        assert_eq!(read_workspace(&path).unwrap(), ws);
        assert!(matches!(
            read_workspace(dir.path().join("missing.txt")),
            Err(FileError::NotFound { .. })
        ));
    }
}
