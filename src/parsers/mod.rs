//! Line-oriented readers for the text formats the built-in algorithms load.
//!
//! Every reader works one line at a time with small `nom` parsers built on each
//! call. Nothing is cached between files.

pub mod ascii;
pub mod crystal;
pub mod user_file;

use nom::character::complete::{char, space0, space1};
use nom::branch::alt;
use nom::combinator::{all_consuming, recognize};
use nom::multi::separated_list1;
use nom::number::complete::double;
use nom::sequence::{delimited, terminated};
use nom::IResult;

/// One or more numbers separated by whitespace and/or commas, filling the whole input.
pub(crate) fn numbers(i: &str) -> IResult<&str, Vec<f64>> {
    let separator = alt((recognize(delimited(space0, char(','), space0)), space1));
    all_consuming(terminated(
        separated_list1(separator, double),
        space0,
    ))(i)
}

/// `line` without anything after `marker`, trimmed.
pub(crate) fn strip_comment(line: &str, marker: char) -> &str {
    match line.find(marker) {
        Some(pos) => line[..pos].trim(),
        None => line.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        assert_eq!(numbers("1 2.5\t-3e2").unwrap().1, vec![1.0, 2.5, -300.0]);
        assert_eq!(numbers("1, 2,3").unwrap().1, vec![1.0, 2.0, 3.0]);
        assert_eq!(numbers("1, 2 3 ,4").unwrap().1, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(numbers("1,,2").is_err());
        assert!(numbers("1 two").is_err());
        assert!(numbers("").is_err());
    }

    #[test]
    fn test_strip_comment() {
        assert_eq!(strip_comment("  Lattice: 5.43 # cubic", '#'), "Lattice: 5.43");
        assert_eq!(strip_comment("# only a comment", '#'), "");
    }
}
