//! Reader for POLDI crystal structure files.
//!
//! ```text
//! # comment
//! Silicon {
//!     Lattice: 5.43
//!     Spacegroup: F d -3 m
//!     Atoms: {
//!         Si 0.0 0.0 0.0 1.0 0.05
//!     }
//! }
//! ```
//!
//! A file may hold any number of compounds. `Lattice:` takes 1 (cubic), 3
//! (orthogonal) or 6 values. Atom lines are `Element x y z [occupancy [U]]`.

use std::fs;
use std::path::Path;

use log::trace;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::{alpha1, char, space0};
use nom::combinator::{all_consuming, recognize, rest};
use nom::sequence::{pair, preceded, terminated, tuple};
use nom::IResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{numbers, strip_comment};
use crate::core::error::FileError;

#[derive(Debug, Error)]
pub enum CrystalFileError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: compound '{compound}' has no {section} section")]
    MissingSection {
        line: usize,
        compound: String,
        section: &'static str,
    },

    #[error("line {line}: compound '{compound}' has more than one {section} section")]
    DuplicateSection {
        line: usize,
        compound: String,
        section: &'static str,
    },

    #[error(transparent)]
    File(#[from] FileError),
}

impl CrystalFileError {
    /// The line the problem was found on, if it came from the content.
    pub fn line(&self) -> Option<usize> {
        match self {
            CrystalFileError::Syntax { line, .. }
            | CrystalFileError::MissingSection { line, .. }
            | CrystalFileError::DuplicateSection { line, .. } => Some(*line),
            CrystalFileError::File(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl UnitCell {
    /// Expands 1, 3 or 6 lattice parameters.
    pub fn from_parameters(values: &[f64]) -> Result<Self, String> {
        let cell = match *values {
            [a] => Self::orthogonal(a, a, a),
            [a, b, c] => Self::orthogonal(a, b, c),
            [a, b, c, alpha, beta, gamma] => Self {
                a,
                b,
                c,
                alpha,
                beta,
                gamma,
            },
            _ => {
                return Err(format!(
                    "expected 1, 3 or 6 lattice parameters, got {}",
                    values.len()
                ));
            }
        };

        if [cell.a, cell.b, cell.c].iter().any(|l| *l <= 0.0) {
            return Err("cell lengths must be positive".to_string());
        }
        if [cell.alpha, cell.beta, cell.gamma]
            .iter()
            .any(|angle| *angle <= 0.0 || *angle >= 180.0)
        {
            return Err("cell angles must lie between 0 and 180 degrees".to_string());
        }
        Ok(cell)
    }

    fn orthogonal(a: f64, b: f64, c: f64) -> Self {
        Self {
            a,
            b,
            c,
            alpha: 90.0,
            beta: 90.0,
            gamma: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub element: String,
    pub position: [f64; 3],
    pub occupancy: f64,
    /// Isotropic displacement parameter.
    pub u_iso: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compound {
    pub name: String,
    pub cell: UnitCell,
    pub space_group: String,
    pub atoms: Vec<Atom>,
}

/// `Name {`
fn compound_open(i: &str) -> IResult<&str, &str> {
    all_consuming(terminated(
        take_while1(|c: char| !c.is_whitespace() && c != '{' && c != '}'),
        pair(space0, char('{')),
    ))(i)
}

/// `Key: rest of line`
fn keyword<'a>(key: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    preceded(tuple((tag(key), space0, char(':'), space0)), rest)
}

fn element(i: &str) -> IResult<&str, &str> {
    recognize(pair(
        alpha1,
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '+' || c == '-'),
    ))(i)
}

fn atom(i: &str) -> Result<Atom, String> {
    let (remainder, symbol) = terminated(element, space0)(i)
        .map_err(|_: nom::Err<nom::error::Error<&str>>| format!("'{i}' does not start with an element"))?;
    let (_, values) = numbers(remainder).map_err(|_| format!("invalid atom parameters '{remainder}'"))?;

    let (position, extra) = match values.len() {
        3..=5 => values.split_at(3),
        n => return Err(format!("expected 3 to 5 numbers after the element, got {n}")),
    };
    Ok(Atom {
        element: symbol.to_string(),
        position: [position[0], position[1], position[2]],
        occupancy: extra.first().copied().unwrap_or(1.0),
        u_iso: extra.get(1).copied().unwrap_or(0.0),
    })
}

/// One compound being read.
struct Partial {
    name: String,
    opened_at: usize,
    cell: Option<UnitCell>,
    space_group: Option<String>,
    atoms: Option<Vec<Atom>>,
}

impl Partial {
    fn finish(self, line: usize) -> Result<Compound, CrystalFileError> {
        let missing = |section| CrystalFileError::MissingSection {
            line,
            compound: self.name.clone(),
            section,
        };
        let cell = self.cell.clone().ok_or_else(|| missing("Lattice"))?;
        let space_group = self.space_group.clone().ok_or_else(|| missing("Spacegroup"))?;
        let atoms = self.atoms.clone().ok_or_else(|| missing("Atoms"))?;
        Ok(Compound {
            name: self.name,
            cell,
            space_group,
            atoms,
        })
    }
}

enum State {
    TopLevel,
    Compound(Partial),
    Atoms(Partial),
}

/// Parses every compound in `text`.
pub fn parse_str(text: &str) -> Result<Vec<Compound>, CrystalFileError> {
    let mut compounds = Vec::new();
    let mut state = State::TopLevel;
    let mut last_line = 0;

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        last_line = line_no;
        let line = strip_comment(raw, '#');
        if line.is_empty() {
            continue;
        }
        let syntax = |message: String| CrystalFileError::Syntax {
            line: line_no,
            message,
        };

        state = match state {
            State::TopLevel => {
                let (_, name) = compound_open(line)
                    .map_err(|_| syntax(format!("expected 'Name {{', found '{line}'")))?;
                trace!("[Compound] {name}");
                State::Compound(Partial {
                    name: name.to_string(),
                    opened_at: line_no,
                    cell: None,
                    space_group: None,
                    atoms: None,
                })
            }
            State::Compound(mut partial) => {
                if line == "}" {
                    trace!("[  End   ] {}", partial.name);
                    compounds.push(partial.finish(line_no)?);
                    State::TopLevel
                } else if let Ok((_, values)) = keyword("Lattice")(line) {
                    trace!("[Lattice ] {values}");
                    let parameters = numbers(values)
                        .map(|(_, v)| v)
                        .map_err(|_| syntax(format!("invalid lattice parameters '{values}'")))?;
                    let cell = UnitCell::from_parameters(&parameters).map_err(syntax)?;
                    if partial.cell.replace(cell).is_some() {
                        return Err(duplicate(line_no, &partial, "Lattice"));
                    }
                    State::Compound(partial)
                } else if let Ok((_, group)) = keyword("Spacegroup")(line) {
                    trace!("[ Group  ] {group}");
                    if group.is_empty() {
                        return Err(syntax("empty space group".to_string()));
                    }
                    if partial.space_group.replace(group.to_string()).is_some() {
                        return Err(duplicate(line_no, &partial, "Spacegroup"));
                    }
                    State::Compound(partial)
                } else if let Ok((_, remainder)) = keyword("Atoms")(line) {
                    if remainder != "{" {
                        return Err(syntax("expected '{' after 'Atoms:'".to_string()));
                    }
                    if partial.atoms.replace(Vec::new()).is_some() {
                        return Err(duplicate(line_no, &partial, "Atoms"));
                    }
                    State::Atoms(partial)
                } else {
                    return Err(syntax(format!("unexpected line '{line}' in compound '{}'", partial.name)));
                }
            }
            State::Atoms(mut partial) => {
                if line == "}" {
                    State::Compound(partial)
                } else {
                    trace!("[  Atom  ] {line}");
                    let parsed = atom(line).map_err(syntax)?;
                    partial.atoms.get_or_insert_with(Vec::new).push(parsed);
                    State::Atoms(partial)
                }
            }
        };
    }

    match state {
        State::TopLevel => Ok(compounds),
        State::Compound(partial) | State::Atoms(partial) => Err(CrystalFileError::Syntax {
            line: last_line,
            message: format!(
                "compound '{}' opened on line {} is never closed",
                partial.name, partial.opened_at
            ),
        }),
    }
}

fn duplicate(line: usize, partial: &Partial, section: &'static str) -> CrystalFileError {
    CrystalFileError::DuplicateSection {
        line,
        compound: partial.name.clone(),
        section,
    }
}

pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<Compound>, CrystalFileError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| FileError::from_io(path, e))?;
    parse_str(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_COMPOUNDS: &str = "\
# Test structures
Silicon {
    Lattice: 5.43
    Spacegroup: F d -3 m
    Atoms: {
        Si 0.0 0.0 0.0 1.0 0.05
    }
}

Corundum {
    Lattice: 4.75 4.75 12.98 90.0 90.0 120.0  # hexagonal setting
    Spacegroup: R -3 c
    Atoms: {
        Al 0 0 0.35216
        O 0.30624 0 0.25 0.9
    }
}
";

    #[test]
    fn test_parse_two_compounds() {
        let compounds = parse_str(TWO_COMPOUNDS).unwrap();
        assert_eq!(compounds.len(), 2);

        let si = &compounds[0];
        assert_eq!(si.name, "Silicon");
        assert_eq!(si.space_group, "F d -3 m");
        assert_eq!(si.cell.c, 5.43);
        assert_eq!(si.cell.gamma, 90.0);
        assert_eq!(si.atoms[0].u_iso, 0.05);

        let al2o3 = &compounds[1];
        assert_eq!(al2o3.cell.gamma, 120.0);
        assert_eq!(al2o3.atoms.len(), 2);
        assert_eq!(al2o3.atoms[0].occupancy, 1.0);
        assert_eq!(al2o3.atoms[0].u_iso, 0.0);
        assert_eq!(al2o3.atoms[1].occupancy, 0.9);
    }

    #[test]
    fn test_empty_file_has_no_compounds() {
        assert!(parse_str("# nothing here\n\n").unwrap().is_empty());
    }

    #[test]
    fn test_lattice_parameter_count() {
        let text = "X {\n Lattice: 1 2\n Spacegroup: P 1\n Atoms: {\n }\n}\n";
        let err = parse_str(text).unwrap_err();
        assert_eq!(err.line(), Some(2));
        assert!(err.to_string().contains("1, 3 or 6"));

        assert_eq!(UnitCell::from_parameters(&[1.0, 2.0, 3.0]).unwrap().b, 2.0);
        assert!(UnitCell::from_parameters(&[-1.0]).is_err());
    }

    #[test]
    fn test_missing_and_duplicate_sections() {
        let missing = "X {\n Lattice: 1\n Atoms: {\n }\n}\n";
        assert!(matches!(
            parse_str(missing).unwrap_err(),
            CrystalFileError::MissingSection { section: "Spacegroup", line: 5, .. }
        ));

        let twice = "X {\n Lattice: 1\n Lattice: 2\n}\n";
        assert!(matches!(
            parse_str(twice).unwrap_err(),
            CrystalFileError::DuplicateSection { section: "Lattice", line: 3, .. }
        ));
    }

    #[test]
    fn test_bad_atom_and_unclosed_compound() {
        let bad_atom = "X {\n Atoms: {\n  Si 0 0\n }\n}\n";
        let err = parse_str(bad_atom).unwrap_err();
        assert_eq!(err.line(), Some(3));

        let unclosed = "X {\n Lattice: 1\n";
        assert!(parse_str(unclosed).unwrap_err().to_string().contains("never closed"));
    }

    #[test]
    fn test_read_file_errors_are_typed() {
        let err = read_file("/no/such/file.dat").unwrap_err();
        assert!(matches!(err, CrystalFileError::File(FileError::NotFound { .. })));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("si.dat");
        fs::write(&path, TWO_COMPOUNDS).unwrap();
        assert_eq!(read_file(&path).unwrap().len(), 2);
    }
}
